//! Structural assembly of fleet artifacts.
//!
//! Stage two of the pipeline. From a [`fleet_spec::ResolvedFleet`] this
//! crate produces, per enabled bot:
//!
//! - a [`RuntimeConfigDocument`] ([`render`]),
//! - a [`WorkloadDescriptor`] ([`plan`]),
//! - Kubernetes manifests and the checksums the reconciler compares
//!   ([`build_releases`]).
//!
//! # Invariants
//!
//! - Output is a pure function of the spec: equal input, byte-identical
//!   output.
//! - `render` and `plan` return the same key set: the enabled bot names.
//! - Values shared by both artifacts come from the same resolved bot.

use thiserror::Error;

pub mod config_doc;
pub mod manifests;
pub mod paths;
pub mod probes;
pub mod workload;

pub use config_doc::{render, render_resolved, RuntimeConfigDocument};
pub use manifests::{build_releases, fleet_checksum, BotRelease};
pub use probes::{Probe, ProbeKind, ProbeSet};
pub use workload::{plan, plan_resolved, EnvValue, WorkloadDescriptor};

/// Errors while emitting artifacts.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to emit manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A bot was planned but not rendered, or the reverse.
    #[error("bot '{0}' is missing from one of the rendered artifact sets")]
    Inconsistent(String),
}
