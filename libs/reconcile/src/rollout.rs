//! Bounded drivers over an [`Orchestrator`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use fleet_spec::MAX_REPLICAS;

use crate::orchestrator::{InstanceState, Orchestrator, Release, WorkloadState};
use crate::{classify_instances, ReconcileError, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};

/// How long to wait for the orchestrator, and how often to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of [`deploy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The live revision already carries this checksum and is settled.
    Unchanged { ready: u32 },

    /// Applied and converged.
    Applied { ready: u32 },
}

/// Result of a successful [`scale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleOutcome {
    pub previous: u32,
    pub ready: u32,
}

enum Wait {
    Settled(WorkloadState),
    TimedOut(Option<WorkloadState>),
}

async fn wait_until<O, F>(
    orch: &O,
    identity: &str,
    policy: &WaitPolicy,
    done: F,
) -> Result<Wait, ReconcileError>
where
    O: Orchestrator + ?Sized,
    F: Fn(&WorkloadState) -> bool,
{
    let deadline = Instant::now() + policy.timeout;
    let mut last = None;

    loop {
        if let Some(state) = orch.workload(identity).await? {
            if done(&state) {
                return Ok(Wait::Settled(state));
            }
            debug!(
                identity,
                desired = state.desired,
                ready = state.ready,
                updated = state.updated,
                "waiting for workload"
            );
            last = Some(state);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(Wait::TimedOut(last));
        }
        tokio::time::sleep(policy.poll_interval.min(deadline - now)).await;
    }
}

/// Roll a release out, atomically or not at all.
///
/// A release whose checksum and replica count are already live and settled
/// is not applied again; one that is live but unsettled (a first deploy
/// that timed out earlier) is waited on instead of re-applied. When the new
/// revision does not converge in time the workload is rolled back if it had
/// a previous revision, and the rollback itself must settle. A first deploy
/// that fails is left in place and reported.
pub async fn deploy<O>(
    orch: &O,
    release: &Release,
    policy: &WaitPolicy,
) -> Result<DeployOutcome, ReconcileError>
where
    O: Orchestrator + ?Sized,
{
    let identity = release.identity.as_str();
    let current = orch.workload(identity).await?;

    let live = current.as_ref().filter(|state| {
        state.checksum.as_ref() == Some(&release.checksum) && state.desired == release.replicas
    });

    if let Some(state) = live {
        if state.is_settled() {
            info!(identity, checksum = %release.checksum, "release unchanged, skipping");
            return Ok(DeployOutcome::Unchanged { ready: state.ready });
        }
        info!(
            identity,
            checksum = %release.checksum,
            ready = state.ready,
            desired = state.desired,
            "release already live but not settled, waiting"
        );
    } else {
        info!(
            identity,
            checksum = %release.checksum,
            replicas = release.replicas,
            "applying release"
        );
        orch.apply(release).await?;
    }
    let applied = live.is_none();

    let settled = wait_until(orch, identity, policy, |state| {
        state.checksum.as_ref() == Some(&release.checksum)
            && state.desired == release.replicas
            && state.is_settled()
    })
    .await?;

    let state = match settled {
        Wait::Settled(state) => state,
        Wait::TimedOut(_) => {
            let instances = orch.instances(identity).await?;
            let failed_instances = failed_instances(instances, release);

            // Judged from the state seen before apply.
            let previous = current.filter(|_| applied);
            let Some(previous) = previous else {
                warn!(identity, ?failed_instances, "rollout timed out, nothing to roll back to");
                return Err(ReconcileError::RolloutFailed {
                    identity: identity.to_string(),
                    failed_instances,
                    rolled_back: false,
                });
            };

            warn!(identity, ?failed_instances, "rollout timed out, rolling back");
            orch.rollback(identity).await?;
            return restore(orch, identity, policy, &previous, failed_instances).await;
        }
    };

    info!(identity, ready = state.ready, "release converged");
    if !applied {
        return Ok(DeployOutcome::Unchanged { ready: state.ready });
    }

    if let Err(error) = orch.prune(identity).await {
        warn!(identity, error = %error, "failed to prune superseded artifacts");
    }
    Ok(DeployOutcome::Applied { ready: state.ready })
}

/// Wait for a rolled-back workload to settle on its previous revision.
///
/// Always an error: the release being deployed did not converge.
async fn restore<O>(
    orch: &O,
    identity: &str,
    policy: &WaitPolicy,
    previous: &WorkloadState,
    failed_instances: Vec<String>,
) -> Result<DeployOutcome, ReconcileError>
where
    O: Orchestrator + ?Sized,
{
    let restored = wait_until(orch, identity, policy, |state| {
        state.checksum == previous.checksum && state.is_settled()
    })
    .await?;

    match restored {
        Wait::Settled(state) => {
            info!(identity, ready = state.ready, "previous revision restored");
            Err(ReconcileError::RolloutFailed {
                identity: identity.to_string(),
                failed_instances,
                rolled_back: true,
            })
        }
        Wait::TimedOut(_) => {
            let instances = orch.instances(identity).await?;
            let mut not_ready: Vec<String> = instances
                .into_iter()
                .filter(|i| !i.ready || i.checksum != previous.checksum)
                .map(|i| i.name)
                .collect();
            not_ready.sort();
            warn!(identity, ?not_ready, "rollback did not settle");
            Err(ReconcileError::RollbackFailed {
                identity: identity.to_string(),
                failed_instances,
                not_ready,
            })
        }
    }
}

/// Instances not running the release, or running it but not ready.
fn failed_instances(instances: Vec<InstanceState>, release: &Release) -> Vec<String> {
    let (matching, old) = classify_instances(instances, &release.checksum, |i| i.checksum.as_ref());

    let mut failed: Vec<String> = matching
        .into_iter()
        .filter(|i| !i.ready)
        .chain(old)
        .map(|i| i.name)
        .collect();
    failed.sort();
    failed
}

/// Change the replica count and wait for the ready count to match.
///
/// On timeout the requested count stays in place; the error carries the
/// previous count as the last known good value.
pub async fn scale<O>(
    orch: &O,
    identity: &str,
    replicas: u32,
    policy: &WaitPolicy,
) -> Result<ScaleOutcome, ReconcileError>
where
    O: Orchestrator + ?Sized,
{
    if replicas > MAX_REPLICAS {
        return Err(ReconcileError::InvalidReplicas {
            requested: replicas,
            max: MAX_REPLICAS,
        });
    }

    let current = orch
        .workload(identity)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(identity.to_string()))?;
    let previous = current.desired;

    if previous == replicas && current.ready == replicas {
        info!(identity, replicas, "already at requested scale");
        return Ok(ScaleOutcome {
            previous,
            ready: current.ready,
        });
    }

    info!(identity, from = previous, to = replicas, "scaling");
    orch.set_replicas(identity, replicas).await?;

    match wait_until(orch, identity, policy, |s| {
        s.desired == replicas && s.ready == replicas
    })
    .await?
    {
        Wait::Settled(state) => Ok(ScaleOutcome {
            previous,
            ready: state.ready,
        }),
        Wait::TimedOut(last) => {
            let ready = last.map_or(0, |s| s.ready);
            warn!(identity, requested = replicas, ready, "scale timed out");
            Err(ReconcileError::ScaleTimeout {
                identity: identity.to_string(),
                requested: replicas,
                ready,
                last_known_good: previous,
            })
        }
    }
}

/// Find the one instance an interactive command should attach to.
///
/// With `name` given it must match exactly; otherwise the workload must
/// have exactly one instance.
pub async fn resolve_single_instance<O>(
    orch: &O,
    identity: &str,
    name: Option<&str>,
) -> Result<InstanceState, ReconcileError>
where
    O: Orchestrator + ?Sized,
{
    let mut instances = orch.instances(identity).await?;

    if let Some(name) = name {
        return instances
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| ReconcileError::NotFound(name.to_string()));
    }

    match instances.len() {
        0 => Err(ReconcileError::NotFound(format!("instances of {identity}"))),
        1 => Ok(instances.remove(0)),
        _ => {
            let mut candidates: Vec<String> = instances.into_iter().map(|i| i.name).collect();
            candidates.sort();
            Err(ReconcileError::Ambiguous {
                identity: identity.to_string(),
                candidates,
            })
        }
    }
}
