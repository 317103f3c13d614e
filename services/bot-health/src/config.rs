//! Health gate configuration, read from the environment.
//!
//! The workload planner sets every `HEALTH_*` variable from the fleet's
//! health settings; the defaults below only apply when the binary runs
//! outside a planned workload.

use std::path::PathBuf;

use crate::error::HealthError;

pub const DEFAULT_DISK_CEILING_PERCENT: u8 = 90;
pub const DEFAULT_MEMORY_SOFT_CEILING_PERCENT: u8 = 90;
pub const DEFAULT_PROCESS_PATTERN: &str = "scheduler.py";
pub const DEFAULT_READY_MARKER: &str = "/run/bot/ready";
pub const DEFAULT_REQUIRED_DIRS: &str = "/app/data:/app/videos:/app/logs";
pub const DEFAULT_VOLUMES: &str = "/app/data:/app/videos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Command-line fragment identifying the main loop process.
    pub process_pattern: String,

    /// Directories that must exist and be writable.
    pub required_dirs: Vec<PathBuf>,

    /// Volumes whose disk usage is checked against the ceiling.
    pub volumes: Vec<PathBuf>,

    pub disk_ceiling_percent: u8,
    pub memory_soft_ceiling_percent: u8,
    pub ready_marker: PathBuf,

    pub proc_root: PathBuf,
    pub cgroup_root: PathBuf,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            process_pattern: DEFAULT_PROCESS_PATTERN.to_string(),
            required_dirs: split_paths(DEFAULT_REQUIRED_DIRS),
            volumes: split_paths(DEFAULT_VOLUMES),
            disk_ceiling_percent: DEFAULT_DISK_CEILING_PERCENT,
            memory_soft_ceiling_percent: DEFAULT_MEMORY_SOFT_CEILING_PERCENT,
            ready_marker: PathBuf::from(DEFAULT_READY_MARKER),
            proc_root: PathBuf::from("/proc"),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
        }
    }
}

impl HealthConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, HealthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HealthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            process_pattern: get("HEALTH_PROCESS_PATTERN").unwrap_or(defaults.process_pattern),
            required_dirs: get("HEALTH_REQUIRED_DIRS")
                .map(|v| split_paths(&v))
                .unwrap_or(defaults.required_dirs),
            volumes: get("HEALTH_VOLUMES")
                .map(|v| split_paths(&v))
                .unwrap_or(defaults.volumes),
            disk_ceiling_percent: percent(
                "HEALTH_DISK_CEILING_PERCENT",
                get("HEALTH_DISK_CEILING_PERCENT"),
                defaults.disk_ceiling_percent,
            )?,
            memory_soft_ceiling_percent: percent(
                "HEALTH_MEMORY_SOFT_CEILING_PERCENT",
                get("HEALTH_MEMORY_SOFT_CEILING_PERCENT"),
                defaults.memory_soft_ceiling_percent,
            )?,
            ready_marker: get("READY_MARKER")
                .map(PathBuf::from)
                .unwrap_or(defaults.ready_marker),
            proc_root: get("HEALTH_PROC_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.proc_root),
            cgroup_root: get("HEALTH_CGROUP_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.cgroup_root),
        })
    }
}

fn split_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn percent(key: &'static str, value: Option<String>, default: u8) -> Result<u8, HealthError> {
    let Some(value) = value else {
        return Ok(default);
    };

    match value.trim().parse::<u8>() {
        Ok(p) if (1..=100).contains(&p) => Ok(p),
        _ => Err(HealthError::InvalidConfig {
            key,
            value,
            reason: "expected a percentage between 1 and 100".to_string(),
        }),
    }
}
