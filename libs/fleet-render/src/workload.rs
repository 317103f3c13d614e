//! Workload descriptors.
//!
//! Orchestrator-neutral description of one bot's workload. Identity,
//! storage and environment are derived here from the resolved fleet; the
//! Kubernetes objects in [`crate::manifests`] are a direct translation.

use std::collections::BTreeMap;

use serde::Serialize;

use fleet_spec::{
    BotName, FleetSpec, ResolvedBot, ResolvedFleet, ResourceSpec, SecretKeyRef, SecurityProfile,
    SpecValidationError,
};

use crate::paths::{CONFIG_PATH, DATA_DIR, LOGS_DIR, MEDIA_DIR, RUNTIME_DIR};
use crate::probes::{health_env, probe_set, ProbeSet};

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_BOT: &str = "fleet.tiksimpro.io/bot";

/// An environment value: literal, or a reference into the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    Secret { secret: String, key: String },
}

impl EnvValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Secret { .. } => None,
        }
    }
}

impl From<&SecretKeyRef> for EnvValue {
    fn from(secret: &SecretKeyRef) -> Self {
        Self::Secret {
            secret: secret.name.clone(),
            key: secret.key.clone(),
        }
    }
}

/// A per-instance persistent volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeClaim {
    pub name: String,
    pub mount_path: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// An instance-local volume that starts empty on every restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScratchVolume {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadDescriptor {
    pub identity: String,
    pub bot: BotName,
    pub replicas: u32,
    pub image: String,
    pub image_pull_policy: String,

    /// Quantities as written in the spec.
    pub resources: ResourceSpec,

    pub env: BTreeMap<String, EnvValue>,
    pub volume_claims: Vec<VolumeClaim>,
    pub scratch_volumes: Vec<ScratchVolume>,
    pub config_mount: String,
    pub probes: ProbeSet,
    pub security: SecurityProfile,
    pub labels: BTreeMap<String, String>,
}

impl WorkloadDescriptor {
    /// Labels that select this workload's instances.
    pub fn selector(&self) -> BTreeMap<String, String> {
        [LABEL_NAME, LABEL_INSTANCE]
            .into_iter()
            .filter_map(|k| self.labels.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

/// Validate the spec and plan one workload per enabled bot.
pub fn plan(spec: &FleetSpec) -> Result<BTreeMap<BotName, WorkloadDescriptor>, SpecValidationError> {
    let fleet = fleet_spec::resolve(spec)?;
    Ok(plan_resolved(&fleet))
}

/// Plan from an already resolved fleet.
pub fn plan_resolved(fleet: &ResolvedFleet) -> BTreeMap<BotName, WorkloadDescriptor> {
    fleet
        .bots
        .iter()
        .map(|bot| (bot.name.clone(), plan_bot(fleet, bot)))
        .collect()
}

fn plan_bot(fleet: &ResolvedFleet, bot: &ResolvedBot) -> WorkloadDescriptor {
    let defaults = &fleet.fleet.spec;
    let storage = &defaults.storage;

    let volume_claims = vec![
        VolumeClaim {
            name: "data".to_string(),
            mount_path: DATA_DIR.to_string(),
            size: fleet.fleet.data_size.to_string(),
            storage_class: storage.class.clone(),
        },
        VolumeClaim {
            name: "media".to_string(),
            mount_path: MEDIA_DIR.to_string(),
            size: fleet.fleet.media_size.to_string(),
            storage_class: storage.class.clone(),
        },
    ];

    let scratch_volumes = vec![
        ScratchVolume {
            name: "runtime".to_string(),
            mount_path: RUNTIME_DIR.to_string(),
        },
        ScratchVolume {
            name: "logs".to_string(),
            mount_path: LOGS_DIR.to_string(),
        },
    ];

    let labels = [
        (LABEL_NAME, "tiksimpro-bot".to_string()),
        (LABEL_INSTANCE, bot.identity.clone()),
        (LABEL_PART_OF, defaults.name.clone()),
        (LABEL_MANAGED_BY, "fleetctl".to_string()),
        (LABEL_BOT, bot.name.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    WorkloadDescriptor {
        identity: bot.identity.clone(),
        bot: bot.name.clone(),
        replicas: bot.replicas,
        image: defaults.image.clone(),
        image_pull_policy: defaults.image_pull_policy.clone(),
        resources: bot.resources.spec.clone(),
        env: environment(fleet, bot),
        volume_claims,
        scratch_volumes,
        config_mount: CONFIG_PATH.to_string(),
        probes: probe_set(&defaults.health),
        security: defaults.security.clone(),
        labels,
    }
}

/// Layered environment; later layers win.
///
/// Identity, then shared infrastructure, then HealthGate settings, then
/// the merged fleet/bot env, then secret references. Identity, password
/// and HealthGate keys are reserved ([`fleet_spec::is_reserved_env_key`]);
/// user env may still override connection hosts and ports.
fn environment(fleet: &ResolvedFleet, bot: &ResolvedBot) -> BTreeMap<String, EnvValue> {
    let defaults = &fleet.fleet.spec;
    let mut env = BTreeMap::new();
    let mut set = |key: &str, value: EnvValue| {
        env.insert(key.to_string(), value);
    };

    set("BOT_ID", EnvValue::literal(bot.name.as_str()));
    set("BOT_ACCOUNT", EnvValue::literal(&bot.account));
    set("BOT_MODE", EnvValue::literal(&defaults.mode));
    set("TZ", EnvValue::literal(&defaults.timezone));

    if let Some(db) = &fleet.fleet.database {
        set("POSTGRES_HOST", EnvValue::literal(&db.host));
        set("POSTGRES_PORT", EnvValue::literal(db.port.to_string()));
        set("POSTGRES_DB", EnvValue::literal(&db.database));
        set("POSTGRES_USER", EnvValue::literal(&db.user));
        set("POSTGRES_PASSWORD", EnvValue::from(&db.password));
    }

    if let Some(cache) = &fleet.fleet.cache {
        set("REDIS_HOST", EnvValue::literal(&cache.host));
        set("REDIS_PORT", EnvValue::literal(cache.port.to_string()));
        set("REDIS_PASSWORD", EnvValue::from(&cache.password));
    }

    for (key, value) in health_env(&defaults.health) {
        set(&key, EnvValue::Literal(value));
    }
    for (key, value) in &bot.env {
        set(key, EnvValue::literal(value));
    }
    for (key, secret) in &bot.secret_env {
        set(key, EnvValue::from(secret));
    }

    env
}
