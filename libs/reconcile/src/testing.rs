//! In-memory orchestrator for tests and dry runs.
//!
//! Workloads converge instantly unless told otherwise: a ready cap limits
//! how many instances ever pass readiness, and a failing checksum never
//! becomes ready at all.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::orchestrator::{InstanceState, Orchestrator, Release, WorkloadState};
use crate::SpecHash;

/// An orchestrator call, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Apply { identity: String, checksum: SpecHash },
    SetReplicas { identity: String, replicas: u32 },
    Rollback(String),
    Restart(String),
    Prune(String),
}

#[derive(Debug, Default)]
struct MockWorkload {
    desired: u32,
    checksum: Option<SpecHash>,
    history: Vec<(SpecHash, u32)>,
    ready_cap: Option<u32>,
    restarts: u32,
}

#[derive(Debug, Default)]
struct MockState {
    workloads: BTreeMap<String, MockWorkload>,
    failing: BTreeSet<SpecHash>,
    calls: Vec<Call>,
}

impl MockState {
    fn ready(&self, workload: &MockWorkload) -> u32 {
        match &workload.checksum {
            Some(checksum) if self.failing.contains(checksum) => 0,
            _ => workload
                .ready_cap
                .map_or(workload.desired, |cap| cap.min(workload.desired)),
        }
    }
}

/// Mock orchestrator.
#[derive(Debug, Default)]
pub struct MockOrchestrator {
    state: Mutex<MockState>,
}

impl MockOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an already-deployed workload.
    pub fn with_workload(self, identity: &str, replicas: u32, checksum: SpecHash) -> Self {
        self.lock().workloads.insert(
            identity.to_string(),
            MockWorkload {
                desired: replicas,
                checksum: Some(checksum),
                ..Default::default()
            },
        );
        self
    }

    /// At most `ready` instances of the workload ever pass readiness.
    pub fn with_ready_cap(self, identity: &str, ready: u32) -> Self {
        self.lock()
            .workloads
            .entry(identity.to_string())
            .or_default()
            .ready_cap = Some(ready);
        self
    }

    /// Instances created from this checksum never become ready.
    pub fn with_failing_release(self, checksum: SpecHash) -> Self {
        self.lock().failing.insert(checksum);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Current state as [`Orchestrator::workload`] would report it.
    pub fn snapshot(&self, identity: &str) -> Option<WorkloadState> {
        let state = self.lock();
        let workload = state.workloads.get(identity)?;
        workload.checksum.as_ref()?;
        let ready = state.ready(workload);
        Some(WorkloadState {
            identity: identity.to_string(),
            desired: workload.desired,
            ready,
            updated: workload.desired,
            checksum: workload.checksum.clone(),
        })
    }
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    async fn workload(&self, identity: &str) -> Result<Option<WorkloadState>> {
        Ok(self.snapshot(identity))
    }

    async fn instances(&self, identity: &str) -> Result<Vec<InstanceState>> {
        let state = self.lock();
        let Some(workload) = state.workloads.get(identity) else {
            return Ok(Vec::new());
        };
        let ready = state.ready(workload);

        Ok((0..workload.desired)
            .map(|ordinal| InstanceState {
                name: format!("{identity}-{ordinal}"),
                ready: ordinal < ready,
                restarts: workload.restarts,
                checksum: workload.checksum.clone(),
            })
            .collect())
    }

    async fn apply(&self, release: &Release) -> Result<()> {
        debug!(identity = %release.identity, checksum = %release.checksum, "[MOCK] apply");
        let mut state = self.lock();
        state.calls.push(Call::Apply {
            identity: release.identity.clone(),
            checksum: release.checksum.clone(),
        });

        let workload = state.workloads.entry(release.identity.clone()).or_default();
        if let Some(previous) = workload.checksum.take() {
            workload.history.push((previous, workload.desired));
        }
        workload.checksum = Some(release.checksum.clone());
        workload.desired = release.replicas;
        Ok(())
    }

    async fn set_replicas(&self, identity: &str, replicas: u32) -> Result<()> {
        debug!(identity, replicas, "[MOCK] set replicas");
        let mut state = self.lock();
        state.calls.push(Call::SetReplicas {
            identity: identity.to_string(),
            replicas,
        });

        let Some(workload) = state.workloads.get_mut(identity) else {
            anyhow::bail!("workload {identity} not found");
        };
        workload.desired = replicas;
        Ok(())
    }

    async fn rollback(&self, identity: &str) -> Result<()> {
        debug!(identity, "[MOCK] rollback");
        let mut state = self.lock();
        state.calls.push(Call::Rollback(identity.to_string()));

        let Some(workload) = state.workloads.get_mut(identity) else {
            anyhow::bail!("workload {identity} not found");
        };
        let Some((checksum, replicas)) = workload.history.pop() else {
            anyhow::bail!("workload {identity} has no previous revision");
        };
        workload.checksum = Some(checksum);
        workload.desired = replicas;
        Ok(())
    }

    async fn prune(&self, identity: &str) -> Result<()> {
        debug!(identity, "[MOCK] prune");
        self.lock().calls.push(Call::Prune(identity.to_string()));
        Ok(())
    }

    async fn restart(&self, identity: &str) -> Result<()> {
        debug!(identity, "[MOCK] restart");
        let mut state = self.lock();
        state.calls.push(Call::Restart(identity.to_string()));

        let Some(workload) = state.workloads.get_mut(identity) else {
            anyhow::bail!("workload {identity} not found");
        };
        workload.restarts += 1;
        Ok(())
    }
}
