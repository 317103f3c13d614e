//! The HealthGate probe contract.
//!
//! Startup suppresses the other two probes until it succeeds and gives the
//! worker `period * failure_threshold` seconds to get there. Liveness
//! failures restart the instance; readiness failures only take it out of
//! selection. The `bot-healthcheck` binary implements the worker side and is
//! configured through the `HEALTH_*` variables returned by [`health_env`].

use std::collections::BTreeMap;

use serde::Serialize;

use fleet_spec::HealthSpec;

use crate::paths::{DATA_DIR, LOGS_DIR, MEDIA_DIR, READY_MARKER};

/// Health-check entry point inside the worker image.
pub const HEALTHCHECK_BIN: &str = "bot-healthcheck";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Startup,
    Liveness,
    Readiness,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Liveness => "liveness",
            Self::Readiness => "readiness",
        }
    }
}

/// One exec probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub kind: ProbeKind,
    pub command: Vec<String>,
    pub period_seconds: u32,
    pub timeout_seconds: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Probe {
    fn exec(kind: ProbeKind, period: u32, timeout: u32, failures: u32) -> Self {
        Self {
            kind,
            command: vec![HEALTHCHECK_BIN.to_string(), kind.as_str().to_string()],
            period_seconds: period,
            timeout_seconds: timeout.min(period),
            failure_threshold: failures,
            success_threshold: 1,
        }
    }

    /// Seconds of consecutive failure before the probe's consequence fires.
    pub fn budget_seconds(&self) -> u64 {
        u64::from(self.period_seconds) * u64::from(self.failure_threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSet {
    pub startup: Probe,
    pub liveness: Probe,
    pub readiness: Probe,
}

pub fn probe_set(health: &HealthSpec) -> ProbeSet {
    ProbeSet {
        startup: Probe::exec(
            ProbeKind::Startup,
            health.startup_period_seconds,
            10,
            health.startup_failure_threshold,
        ),
        liveness: Probe::exec(
            ProbeKind::Liveness,
            health.liveness_period_seconds,
            10,
            health.liveness_failure_threshold,
        ),
        readiness: Probe::exec(
            ProbeKind::Readiness,
            health.readiness_period_seconds,
            5,
            health.readiness_failure_threshold,
        ),
    }
}

/// Environment for `bot-healthcheck`, derived from the same settings as
/// the probes.
pub fn health_env(health: &HealthSpec) -> BTreeMap<String, String> {
    [
        (
            "HEALTH_DISK_CEILING_PERCENT",
            health.disk_ceiling_percent.to_string(),
        ),
        (
            "HEALTH_MEMORY_SOFT_CEILING_PERCENT",
            health.memory_soft_ceiling_percent.to_string(),
        ),
        ("HEALTH_PROCESS_PATTERN", health.process_pattern.clone()),
        (
            "HEALTH_REQUIRED_DIRS",
            [DATA_DIR, MEDIA_DIR, LOGS_DIR].join(":"),
        ),
        ("HEALTH_VOLUMES", [DATA_DIR, MEDIA_DIR].join(":")),
        ("READY_MARKER", READY_MARKER.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_probe_set() {
        let probes = probe_set(&HealthSpec::default());

        assert_eq!(probes.startup.command, vec!["bot-healthcheck", "startup"]);
        assert_eq!(probes.startup.budget_seconds(), 300);
        assert_eq!(probes.liveness.period_seconds, 30);
        assert_eq!(probes.liveness.failure_threshold, 3);
        assert_eq!(probes.readiness.timeout_seconds, 5);
        assert_eq!(probes.readiness.command[1], "readiness");
    }

    #[test]
    fn timeout_never_exceeds_period() {
        let health = HealthSpec {
            readiness_period_seconds: 2,
            ..HealthSpec::default()
        };
        assert_eq!(probe_set(&health).readiness.timeout_seconds, 2);
    }

    #[test]
    fn health_env_mirrors_settings() {
        let health = HealthSpec {
            disk_ceiling_percent: 80,
            ..HealthSpec::default()
        };
        let env = health_env(&health);
        assert_eq!(env["HEALTH_DISK_CEILING_PERCENT"], "80");
        assert_eq!(env["HEALTH_PROCESS_PATTERN"], "scheduler.py");
        assert_eq!(env["READY_MARKER"], "/run/bot/ready");
        assert_eq!(env["HEALTH_REQUIRED_DIRS"], "/app/data:/app/videos:/app/logs");
    }
}
