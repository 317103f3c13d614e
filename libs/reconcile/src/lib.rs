//! Reconciliation primitives for bot workloads.
//!
//! The orchestrator does the actual converging; this crate decides what to
//! ask of it and how long to wait. Key concepts:
//!
//! - **Release**: rendered config and workload for one bot, identified by
//!   its checksum.
//! - **Convergence**: every desired instance is updated to the release and
//!   passing readiness.
//! - **Bounded waits**: every driver gives up after its [`WaitPolicy`]
//!   timeout and reports the last observed state.
//!
//! # Invariants
//!
//! - Applying a release whose checksum is already live and settled is a
//!   no-op; a live but unsettled release is waited on, never reported as
//!   unchanged.
//! - A failed rollout never leaves a mix of revisions when a previous
//!   revision exists; it is rolled back and the rollback must settle.
//! - A scale timeout does not revert the replica count.

use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod orchestrator;
pub mod rollout;
pub mod testing;

pub use orchestrator::{InstanceState, Orchestrator, Release, WorkloadState};
pub use rollout::{deploy, resolve_single_instance, scale, DeployOutcome, ScaleOutcome, WaitPolicy};

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Workload or instance not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one instance matched where exactly one was required.
    #[error("{identity} has {} instances ({}); pick one", .candidates.len(), .candidates.join(", "))]
    Ambiguous {
        identity: String,
        candidates: Vec<String>,
    },

    /// Release did not converge in time.
    #[error(
        "rollout of {identity} did not converge (failed instances: {}){}",
        .failed_instances.join(", "),
        rollback_note(.rolled_back)
    )]
    RolloutFailed {
        identity: String,
        failed_instances: Vec<String>,
        rolled_back: bool,
    },

    /// Rollout failed and the restored previous revision did not settle.
    #[error(
        "rollout of {identity} did not converge (failed instances: {}) and the previous revision did not settle after rollback (not ready: {})",
        .failed_instances.join(", "),
        .not_ready.join(", ")
    )]
    RollbackFailed {
        identity: String,
        failed_instances: Vec<String>,
        not_ready: Vec<String>,
    },

    /// Scale did not reach the requested ready count in time.
    #[error(
        "scaling {identity} to {requested} timed out with {ready} ready (last known good: {last_known_good})"
    )]
    ScaleTimeout {
        identity: String,
        requested: u32,
        ready: u32,
        last_known_good: u32,
    },

    /// Replica count outside the allowed range.
    #[error("replica count {requested} exceeds the maximum of {max}")]
    InvalidReplicas { requested: u32, max: u32 },

    /// Orchestrator call failed.
    #[error(transparent)]
    Orchestrator(#[from] anyhow::Error),
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "; rolled back to previous revision"
    } else {
        ""
    }
}

/// Convergence status for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Live revision matches the desired checksum and all instances are ready.
    Converged,

    /// Live revision matches but instances are still updating or starting.
    Converging,

    /// Live revision differs from the desired checksum.
    Diverged,

    /// Workload not found.
    Unknown,
}

impl ConvergenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Converging => "converging",
            Self::Diverged => "diverged",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A spec hash for deterministic comparison.
///
/// Used to detect when a rendered config or workload has changed.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        Self::from_bytes(canonical_json(json).as_bytes())
    }

    /// Compute a spec hash over raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Wrap a hash read back from the orchestrator (e.g. an annotation).
    pub fn parse(value: &str) -> Option<Self> {
        let hex_part = value.strip_prefix("sha256:")?;
        (hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex digits, for resource name suffixes.
    pub fn short(&self) -> &str {
        let hex_part = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        &hex_part[..hex_part.len().min(8)]
    }
}

impl std::fmt::Display for SpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Split instances into those running the desired spec and the rest.
///
/// Returns `(matching, old)`.
pub fn classify_instances<I, F>(
    instances: I,
    desired_spec_hash: &SpecHash,
    get_spec_hash: F,
) -> (Vec<I::Item>, Vec<I::Item>)
where
    I: IntoIterator,
    F: Fn(&I::Item) -> Option<&SpecHash>,
{
    let mut matching = Vec::new();
    let mut old = Vec::new();

    for instance in instances {
        if get_spec_hash(&instance) == Some(desired_spec_hash) {
            matching.push(instance);
        } else {
            old.push(instance);
        }
    }

    (matching, old)
}

/// Default poll interval while waiting on the orchestrator.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default rollout/scale wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60); // 10 minutes
