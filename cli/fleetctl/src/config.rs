//! Persistent CLI configuration.
//!
//! Read from `config.json` in the platform config directory. Every field
//! is optional; flags and their environment variables take precedence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_SPEC_PATH: &str = "fleet.toml";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("io", "tiksimpro", "fleetctl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fleet spec used when `--spec` is not given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<PathBuf>,

    /// Namespace override; otherwise the spec decides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// kubectl context; otherwise kubectl's current context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    /// Readiness wait for deploy, update and scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,

    /// Parent directory for `fleetctl backup`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

impl Config {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_seconds
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS)
                .max(1),
        )
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("backups"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.backup_dir(), PathBuf::from("backups"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{ "kube_context": "prod", "timeout_seconds": 300, "poll_interval_seconds": 0 }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.kube_context.as_deref(), Some("prod"));
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.namespace.is_none());
    }
}
