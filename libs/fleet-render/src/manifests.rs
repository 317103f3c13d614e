//! Kubernetes manifests and release checksums.
//!
//! Each bot becomes a ConfigMap, a headless Service and a StatefulSet. The
//! ConfigMap name carries the config checksum, so every StatefulSet
//! revision points at the exact config it was rendered with and a rollback
//! restores a matching pair.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use fleet_reconcile::{Release, SpecHash};
use fleet_spec::{BotName, ResolvedFleet};

use crate::config_doc::{render_resolved, RuntimeConfigDocument};
use crate::paths::{CONFIG_FILE, CONFIG_PATH};
use crate::workload::{plan_resolved, EnvValue, WorkloadDescriptor};
use crate::RenderError;

pub const CONFIG_CHECKSUM_ANNOTATION: &str = "fleet.tiksimpro.io/config-checksum";
pub const RELEASE_CHECKSUM_ANNOTATION: &str = "fleet.tiksimpro.io/release-checksum";

/// Marks the per-release config maps, which are pruned once no revision
/// refers to them.
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const CONFIG_COMPONENT: &str = "config";

/// Controller revisions kept per StatefulSet; bounds the config maps a
/// rollback may still need.
pub const REVISION_HISTORY_LIMIT: u32 = 5;

/// Everything rendered for one bot.
#[derive(Debug, Clone)]
pub struct BotRelease {
    pub config: RuntimeConfigDocument,
    pub descriptor: WorkloadDescriptor,
    pub config_checksum: SpecHash,
    pub release: Release,
}

impl BotRelease {
    pub fn config_map_name(&self) -> String {
        config_map_name(&self.descriptor.identity, &self.config_checksum)
    }
}

pub fn config_map_name(identity: &str, config_checksum: &SpecHash) -> String {
    format!("{identity}-config-{}", config_checksum.short())
}

/// Checksum over the config document and the descriptor.
///
/// The replica count is left out: scaling is not a new revision and must
/// not restart instances.
pub fn release_checksum(
    config: &RuntimeConfigDocument,
    descriptor: &WorkloadDescriptor,
) -> Result<SpecHash, RenderError> {
    let mut workload = serde_json::to_value(descriptor)?;
    if let Some(fields) = workload.as_object_mut() {
        fields.remove("replicas");
    }
    Ok(SpecHash::from_json(&json!({
        "config": config.as_value(),
        "workload": workload,
    })))
}

/// Render configs, plan workloads and assemble a release per bot.
pub fn build_releases(fleet: &ResolvedFleet) -> Result<BTreeMap<BotName, BotRelease>, RenderError> {
    let mut configs = render_resolved(fleet);
    let namespace = fleet.fleet.spec.namespace();

    plan_resolved(fleet)
        .into_iter()
        .map(|(name, descriptor)| {
            let config = configs
                .remove(&name)
                .ok_or_else(|| RenderError::Inconsistent(name.to_string()))?;
            let config_checksum = config.checksum();
            let checksum = release_checksum(&config, &descriptor)?;
            let manifest = bot_manifests(namespace, &config, &descriptor, &checksum)?;

            let release = Release {
                identity: descriptor.identity.clone(),
                replicas: descriptor.replicas,
                checksum,
                manifest,
            };
            Ok((
                name,
                BotRelease {
                    config,
                    descriptor,
                    config_checksum,
                    release,
                },
            ))
        })
        .collect()
}

/// One checksum for the whole fleet, over every bot's release checksum.
pub fn fleet_checksum(releases: &BTreeMap<BotName, BotRelease>) -> SpecHash {
    let entries: serde_json::Map<String, Value> = releases
        .values()
        .map(|r| (r.release.identity.clone(), json!(r.release.checksum)))
        .collect();
    SpecHash::from_json(&Value::Object(entries))
}

/// Multi-document YAML for one bot.
pub fn bot_manifests(
    namespace: &str,
    config: &RuntimeConfigDocument,
    descriptor: &WorkloadDescriptor,
    release_checksum: &SpecHash,
) -> Result<String, RenderError> {
    let config_checksum = config.checksum();
    let config_map = config_map_name(&descriptor.identity, &config_checksum);

    let documents = [
        config_map_manifest(namespace, &config_map, config, descriptor),
        service_manifest(namespace, descriptor),
        stateful_set_manifest(
            namespace,
            &config_map,
            descriptor,
            &config_checksum,
            release_checksum,
        ),
    ];

    let mut out = String::new();
    for (i, document) in documents.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(document)?);
    }
    Ok(out)
}

fn metadata(namespace: &str, name: &str, descriptor: &WorkloadDescriptor) -> Value {
    json!({
        "name": name,
        "namespace": namespace,
        "labels": descriptor.labels,
    })
}

fn config_map_manifest(
    namespace: &str,
    name: &str,
    config: &RuntimeConfigDocument,
    descriptor: &WorkloadDescriptor,
) -> Value {
    let mut meta = metadata(namespace, name, descriptor);
    meta["labels"][LABEL_COMPONENT] = json!(CONFIG_COMPONENT);

    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": meta,
        "data": { CONFIG_FILE: config.to_json() },
    })
}

fn service_manifest(namespace: &str, descriptor: &WorkloadDescriptor) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata(namespace, &descriptor.identity, descriptor),
        "spec": {
            "clusterIP": "None",
            "selector": descriptor.selector(),
        },
    })
}

fn stateful_set_manifest(
    namespace: &str,
    config_map: &str,
    descriptor: &WorkloadDescriptor,
    config_checksum: &SpecHash,
    release_checksum: &SpecHash,
) -> Value {
    let mut meta = metadata(namespace, &descriptor.identity, descriptor);
    meta["annotations"] = json!({ RELEASE_CHECKSUM_ANNOTATION: release_checksum });

    let env: Vec<Value> = descriptor
        .env
        .iter()
        .map(|(name, value)| match value {
            EnvValue::Literal(value) => json!({ "name": name, "value": value }),
            EnvValue::Secret { secret, key } => json!({
                "name": name,
                "valueFrom": { "secretKeyRef": { "name": secret, "key": key } },
            }),
        })
        .collect();

    let mut mounts: Vec<Value> = descriptor
        .volume_claims
        .iter()
        .map(|v| json!({ "name": v.name, "mountPath": v.mount_path }))
        .chain(
            descriptor
                .scratch_volumes
                .iter()
                .map(|v| json!({ "name": v.name, "mountPath": v.mount_path })),
        )
        .collect();
    mounts.push(json!({
        "name": "config",
        "mountPath": CONFIG_PATH,
        "subPath": CONFIG_FILE,
        "readOnly": true,
    }));

    let mut volumes: Vec<Value> = descriptor
        .scratch_volumes
        .iter()
        .map(|v| json!({ "name": v.name, "emptyDir": {} }))
        .collect();
    volumes.push(json!({ "name": "config", "configMap": { "name": config_map } }));

    let claims: Vec<Value> = descriptor
        .volume_claims
        .iter()
        .map(|v| {
            let mut spec = json!({
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": v.size } },
            });
            if let Some(class) = &v.storage_class {
                spec["storageClassName"] = json!(class);
            }
            json!({ "metadata": { "name": v.name }, "spec": spec })
        })
        .collect();

    let probe = |p: &crate::probes::Probe| {
        json!({
            "exec": { "command": p.command },
            "periodSeconds": p.period_seconds,
            "timeoutSeconds": p.timeout_seconds,
            "failureThreshold": p.failure_threshold,
            "successThreshold": p.success_threshold,
        })
    };

    let resources = &descriptor.resources;
    let security = &descriptor.security;

    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": meta,
        "spec": {
            "serviceName": descriptor.identity,
            "replicas": descriptor.replicas,
            "podManagementPolicy": "OrderedReady",
            "revisionHistoryLimit": REVISION_HISTORY_LIMIT,
            "updateStrategy": { "type": "RollingUpdate" },
            "selector": { "matchLabels": descriptor.selector() },
            "template": {
                "metadata": {
                    "labels": descriptor.labels,
                    "annotations": {
                        CONFIG_CHECKSUM_ANNOTATION: config_checksum,
                        RELEASE_CHECKSUM_ANNOTATION: release_checksum,
                    },
                },
                "spec": {
                    "securityContext": {
                        "runAsUser": security.run_as_user,
                        "runAsGroup": security.run_as_group,
                        "fsGroup": security.fs_group,
                        "runAsNonRoot": security.run_as_non_root,
                    },
                    "containers": [{
                        "name": "bot",
                        "image": descriptor.image,
                        "imagePullPolicy": descriptor.image_pull_policy,
                        "env": env,
                        "resources": {
                            "requests": {
                                "memory": resources.requests.memory,
                                "cpu": resources.requests.cpu,
                            },
                            "limits": {
                                "memory": resources.limits.memory,
                                "cpu": resources.limits.cpu,
                            },
                        },
                        "volumeMounts": mounts,
                        "startupProbe": probe(&descriptor.probes.startup),
                        "livenessProbe": probe(&descriptor.probes.liveness),
                        "readinessProbe": probe(&descriptor.probes.readiness),
                        "securityContext": {
                            "allowPrivilegeEscalation": false,
                            "readOnlyRootFilesystem": security.read_only_root_filesystem,
                        },
                    }],
                    "volumes": volumes,
                },
            },
            "volumeClaimTemplates": claims,
        },
    })
}
