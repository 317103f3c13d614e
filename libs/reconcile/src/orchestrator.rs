//! The seam to the external orchestrator.
//!
//! Implementations report observed state and accept desired state; they
//! never wait. Waiting and timeouts live in [`crate::rollout`].

use anyhow::Result;
use async_trait::async_trait;

use crate::{ConvergenceStatus, SpecHash};

/// Rendered artifacts for one bot, ready to hand to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Workload identity (`{fleet}-{bot}`).
    pub identity: String,

    pub replicas: u32,

    /// Hash over the config document and workload descriptor.
    pub checksum: SpecHash,

    /// Orchestrator-native manifest text (multi-document YAML).
    pub manifest: String,
}

/// Observed state of one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadState {
    pub identity: String,

    /// Replica count the orchestrator is converging to.
    pub desired: u32,

    /// Instances passing readiness.
    pub ready: u32,

    /// Instances running the current revision.
    pub updated: u32,

    /// Release checksum recorded on the live revision.
    pub checksum: Option<SpecHash>,
}

impl WorkloadState {
    /// Every desired instance updated and ready.
    pub fn is_settled(&self) -> bool {
        self.updated >= self.desired && self.ready == self.desired
    }

    pub fn convergence(&self, desired: &SpecHash) -> ConvergenceStatus {
        if self.checksum.as_ref() != Some(desired) {
            ConvergenceStatus::Diverged
        } else if self.is_settled() {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::Converging
        }
    }
}

/// Observed state of one instance of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceState {
    pub name: String,
    pub ready: bool,
    pub restarts: u32,

    /// Release checksum the instance was created from.
    pub checksum: Option<SpecHash>,
}

/// Orchestrator interface.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Current state of a workload, or `None` if it has never been deployed.
    async fn workload(&self, identity: &str) -> Result<Option<WorkloadState>>;

    /// Instances of a workload, ordered by name.
    async fn instances(&self, identity: &str) -> Result<Vec<InstanceState>>;

    /// Submit a release. Returns once the orchestrator accepted it.
    async fn apply(&self, release: &Release) -> Result<()>;

    /// Change the desired replica count without touching the revision.
    async fn set_replicas(&self, identity: &str, replicas: u32) -> Result<()>;

    /// Restore the previous revision (config and workload together).
    ///
    /// Instances still running the abandoned revision are replaced rather
    /// than left for the rolling update to reach.
    async fn rollback(&self, identity: &str) -> Result<()>;

    /// Delete per-release artifacts (config maps) that neither the live
    /// revision nor its rollback history refer to.
    async fn prune(&self, identity: &str) -> Result<()>;

    /// Recreate instances in place, keeping revision and volumes.
    async fn restart(&self, identity: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(desired: u32, ready: u32, updated: u32, checksum: &SpecHash) -> WorkloadState {
        WorkloadState {
            identity: "tiksimpro-bot1".into(),
            desired,
            ready,
            updated,
            checksum: Some(checksum.clone()),
        }
    }

    #[test]
    fn convergence_follows_checksum_and_readiness() {
        let current = SpecHash::from_bytes(b"v2");
        let old = SpecHash::from_bytes(b"v1");

        assert_eq!(
            state(2, 2, 2, &current).convergence(&current),
            ConvergenceStatus::Converged
        );
        assert_eq!(
            state(2, 1, 2, &current).convergence(&current),
            ConvergenceStatus::Converging
        );
        assert_eq!(
            state(2, 2, 2, &old).convergence(&current),
            ConvergenceStatus::Diverged
        );
        assert!(state(0, 0, 0, &current).is_settled());
    }
}
