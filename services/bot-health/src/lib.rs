//! Worker-side health gate for bot instances.
//!
//! Three probes share one binary:
//!
//! - `startup`: the main loop process is running and the working
//!   directories are writable.
//! - `liveness`: the startup checks, plus disk usage under the hard
//!   ceiling and memory usage under the soft ceiling (warning only).
//! - `readiness`: the readiness marker exists.
//!
//! Each check writes one line to stdout; the probe passes when no check
//! fails.

pub mod checks;
pub mod config;
pub mod error;
pub mod gate;
pub mod marker;

use std::fmt;
use std::io::{self, Write};

pub use checks::{CheckResult, Outcome};
pub use config::HealthConfig;
pub use error::HealthError;
pub use gate::{Action, GatePolicy, Phase, ProbeTracker, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    Startup,
    Liveness,
    Readiness,
}

impl Probe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Probe::Startup => "startup",
            Probe::Liveness => "liveness",
            Probe::Readiness => "readiness",
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub probe: Probe,
    pub results: Vec<CheckResult>,
}

impl Report {
    pub fn healthy(&self) -> bool {
        !self.results.iter().any(|r| r.outcome == Outcome::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.outcome == Outcome::Fail)
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for result in &self.results {
            writeln!(out, "{result}")?;
        }
        Ok(())
    }
}

/// Run every check belonging to `probe`.
pub fn run_probe(probe: Probe, config: &HealthConfig) -> Report {
    let mut results = Vec::new();

    match probe {
        Probe::Startup | Probe::Liveness => {
            results.push(checks::check_process(
                &config.proc_root,
                &config.process_pattern,
            ));
            results.extend(checks::check_dirs(&config.required_dirs));

            if probe == Probe::Liveness {
                results.extend(checks::check_disk(
                    &config.volumes,
                    config.disk_ceiling_percent,
                ));
                results.push(checks::check_memory(
                    &config.cgroup_root,
                    &config.proc_root,
                    config.memory_soft_ceiling_percent,
                ));
            }
        }
        Probe::Readiness => {
            let marker = config.ready_marker.display();
            results.push(if marker::is_ready(&config.ready_marker) {
                CheckResult {
                    check: "ready-marker",
                    outcome: Outcome::Pass,
                    detail: format!("{marker} present"),
                }
            } else {
                CheckResult {
                    check: "ready-marker",
                    outcome: Outcome::Fail,
                    detail: format!("{marker} absent, still initialising"),
                }
            });
        }
    }

    Report { probe, results }
}
