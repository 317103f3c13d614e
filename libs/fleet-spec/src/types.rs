//! Declarative fleet description as read from `fleet.toml`.
//!
//! These are raw inputs: quantities and schedules are still strings and
//! defaults that depend on other fields (database host, namespace) are not
//! applied yet. [`crate::resolve`] turns a `FleetSpec` into checked values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SpecValidationError;

/// The whole fleet: shared defaults plus an ordered list of bots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetSpec {
    pub fleet: FleetDefaults,

    #[serde(default)]
    pub bots: Vec<BotSpec>,
}

impl FleetSpec {
    /// Parse a fleet spec from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, SpecValidationError> {
        toml::from_str(contents).map_err(|e| SpecValidationError::Parse(e.to_string()))
    }

    /// Serialize back to TOML (used for backups).
    pub fn to_toml_string(&self) -> Result<String, SpecValidationError> {
        toml::to_string_pretty(self).map_err(|e| SpecValidationError::Parse(e.to_string()))
    }

    /// Find a bot by name.
    pub fn bot(&self, name: &str) -> Option<&BotSpec> {
        self.bots.iter().find(|b| b.name == name)
    }
}

/// Fleet-wide settings applied as the base layer under every bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetDefaults {
    /// Fleet name (slug); prefix of every workload identity.
    pub name: String,

    /// Target namespace. Defaults to the fleet name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Container image reference.
    pub image: String,

    #[serde(default = "default_pull_policy")]
    pub image_pull_policy: String,

    /// Exported to workers as `BOT_MODE`.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Timezone for publisher schedules.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub storage: StorageDefaults,

    #[serde(default)]
    pub security: SecurityProfile,

    #[serde(default)]
    pub resources: ResourceSpec,

    #[serde(default)]
    pub infra: InfraSpec,

    #[serde(default)]
    pub health: HealthSpec,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl FleetDefaults {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.name)
    }
}

fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

fn default_mode() -> String {
    "production".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Volume sizing shared by every bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageDefaults {
    /// Storage class; cluster default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default = "default_data_size")]
    pub data_size: String,

    #[serde(default = "default_media_size")]
    pub media_size: String,
}

fn default_data_size() -> String {
    "5Gi".to_string()
}

fn default_media_size() -> String {
    "20Gi".to_string()
}

impl Default for StorageDefaults {
    fn default() -> Self {
        Self {
            class: None,
            data_size: default_data_size(),
            media_size: default_media_size(),
        }
    }
}

/// Pod security profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityProfile {
    #[serde(default = "default_uid")]
    pub run_as_user: u32,

    #[serde(default = "default_uid")]
    pub run_as_group: u32,

    #[serde(default = "default_uid")]
    pub fs_group: u32,

    #[serde(default = "default_true")]
    pub run_as_non_root: bool,

    #[serde(default)]
    pub read_only_root_filesystem: bool,
}

fn default_uid() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self {
            run_as_user: default_uid(),
            run_as_group: default_uid(),
            fs_group: default_uid(),
            run_as_non_root: true,
            read_only_root_filesystem: false,
        }
    }
}

/// Requests and limits for one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub requests: ResourceList,
    pub limits: ResourceList,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            requests: ResourceList {
                memory: "1Gi".to_string(),
                cpu: "500m".to_string(),
            },
            limits: ResourceList {
                memory: "2Gi".to_string(),
                cpu: "1".to_string(),
            },
        }
    }
}

/// A memory/cpu pair, as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceList {
    pub memory: String,
    pub cpu: String,
}

/// Shared infrastructure toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfraSpec {
    #[serde(default)]
    pub database: DatabaseSpec,

    #[serde(default)]
    pub cache: CacheSpec,
}

/// Shared database connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Defaults to `{fleet}-postgresql`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_postgres_port")]
    pub port: u16,

    /// Defaults to the fleet name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Defaults to the fleet name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Defaults to secret `{fleet}-postgresql`, key `password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,
}

fn default_postgres_port() -> u16 {
    5432
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            host: None,
            port: default_postgres_port(),
            database: None,
            user: None,
            password_secret: None,
        }
    }
}

/// Shared cache connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Defaults to `{fleet}-redis-master`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Defaults to secret `{fleet}-redis`, key `redis-password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for CacheSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            host: None,
            port: default_redis_port(),
            password_secret: None,
        }
    }
}

/// Reference to one key of a secret in the external secret store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

impl SecretKeyRef {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

/// HealthGate tunables. The planner copies these into both the probe
/// definitions and the worker environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSpec {
    /// Disk usage (percent) at which liveness fails.
    #[serde(default = "default_ceiling")]
    pub disk_ceiling_percent: u8,

    /// Memory usage (percent of limit) that is logged as a warning.
    #[serde(default = "default_ceiling")]
    pub memory_soft_ceiling_percent: u8,

    /// Command-line fragment identifying the worker's main loop.
    #[serde(default = "default_process_pattern")]
    pub process_pattern: String,

    #[serde(default = "default_startup_period")]
    pub startup_period_seconds: u32,

    /// Startup budget is `startup_period_seconds * startup_failure_threshold`.
    #[serde(default = "default_startup_failures")]
    pub startup_failure_threshold: u32,

    #[serde(default = "default_liveness_period")]
    pub liveness_period_seconds: u32,

    #[serde(default = "default_failure_threshold")]
    pub liveness_failure_threshold: u32,

    #[serde(default = "default_readiness_period")]
    pub readiness_period_seconds: u32,

    #[serde(default = "default_failure_threshold")]
    pub readiness_failure_threshold: u32,
}

fn default_ceiling() -> u8 {
    90
}

fn default_process_pattern() -> String {
    "scheduler.py".to_string()
}

fn default_startup_period() -> u32 {
    10
}

fn default_startup_failures() -> u32 {
    30
}

fn default_liveness_period() -> u32 {
    30
}

fn default_readiness_period() -> u32 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

impl Default for HealthSpec {
    fn default() -> Self {
        Self {
            disk_ceiling_percent: default_ceiling(),
            memory_soft_ceiling_percent: default_ceiling(),
            process_pattern: default_process_pattern(),
            startup_period_seconds: default_startup_period(),
            startup_failure_threshold: default_startup_failures(),
            liveness_period_seconds: default_liveness_period(),
            liveness_failure_threshold: default_failure_threshold(),
            readiness_period_seconds: default_readiness_period(),
            readiness_failure_threshold: default_failure_threshold(),
        }
    }
}

/// One declared worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotSpec {
    pub name: String,

    /// External account identity; passed through untouched.
    pub account: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,

    /// Replaces the fleet resource profile when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Environment entries delivered from the secret store.
    #[serde(default)]
    pub secret_env: BTreeMap<String, SecretKeyRef>,
}

fn default_replicas() -> u32 {
    1
}

/// Publishing settings for one platform of one bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 5-field cron expression; required when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Publishing target identity; defaults to the bot account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}
