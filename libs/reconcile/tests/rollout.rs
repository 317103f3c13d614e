//! Driver behaviour against the in-memory orchestrator.

use std::time::Duration;

use fleet_reconcile::testing::{Call, MockOrchestrator};
use fleet_reconcile::{
    deploy, resolve_single_instance, scale, DeployOutcome, ReconcileError, Release, ScaleOutcome,
    SpecHash, WaitPolicy,
};
use rstest::rstest;

const BOT1: &str = "tiksimpro-bot1";

fn release(tag: &str, replicas: u32) -> Release {
    Release {
        identity: BOT1.to_string(),
        replicas,
        checksum: SpecHash::from_bytes(tag.as_bytes()),
        manifest: format!("# {tag}\n"),
    }
}

fn policy(timeout_secs: u64) -> WaitPolicy {
    WaitPolicy::with_timeout(Duration::from_secs(timeout_secs))
}

#[tokio::test(start_paused = true)]
async fn unchanged_release_is_not_applied() {
    let current = release("v1", 1);
    let orch = MockOrchestrator::new().with_workload(BOT1, 1, current.checksum.clone());

    let outcome = deploy(&orch, &current, &policy(60)).await.unwrap();

    assert_eq!(outcome, DeployOutcome::Unchanged { ready: 1 });
    assert!(orch.calls().is_empty());
}

/// A first deploy that timed out is left in place; deploying the same
/// release again must wait on it and fail, not report it unchanged.
#[tokio::test(start_paused = true)]
async fn timed_out_first_deploy_is_not_unchanged_on_retry() {
    let broken = release("v1", 2);
    let orch = MockOrchestrator::new().with_failing_release(broken.checksum.clone());

    let first = deploy(&orch, &broken, &policy(30)).await.unwrap_err();
    assert!(matches!(first, ReconcileError::RolloutFailed { rolled_back: false, .. }));

    let second = deploy(&orch, &broken, &policy(30)).await.unwrap_err();
    match second {
        ReconcileError::RolloutFailed {
            failed_instances,
            rolled_back,
            ..
        } => {
            assert_eq!(failed_instances, vec!["tiksimpro-bot1-0", "tiksimpro-bot1-1"]);
            assert!(!rolled_back);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Applied once, never re-applied or rolled back.
    assert_eq!(
        orch.calls(),
        vec![Call::Apply {
            identity: BOT1.to_string(),
            checksum: broken.checksum.clone(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn live_release_short_of_ready_is_waited_on() {
    let current = release("v1", 2);
    let orch = MockOrchestrator::new()
        .with_workload(BOT1, 2, current.checksum.clone())
        .with_ready_cap(BOT1, 1);

    let started = tokio::time::Instant::now();
    let err = deploy(&orch, &current, &policy(60)).await.unwrap_err();

    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(matches!(
        err,
        ReconcileError::RolloutFailed { rolled_back: false, ref failed_instances, .. }
            if failed_instances == &["tiksimpro-bot1-1"]
    ));
    assert!(orch.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn changed_release_is_applied_and_converges() {
    let orch = MockOrchestrator::new().with_workload(BOT1, 1, release("v1", 1).checksum);
    let next = release("v2", 2);

    let outcome = deploy(&orch, &next, &policy(60)).await.unwrap();

    assert_eq!(outcome, DeployOutcome::Applied { ready: 2 });
    assert_eq!(
        orch.calls(),
        vec![
            Call::Apply {
                identity: BOT1.to_string(),
                checksum: next.checksum.clone(),
            },
            Call::Prune(BOT1.to_string()),
        ]
    );
    assert_eq!(orch.snapshot(BOT1).unwrap().checksum, Some(next.checksum));
}

#[tokio::test(start_paused = true)]
async fn same_checksum_with_drifted_replicas_is_reapplied() {
    let current = release("v1", 2);
    let orch = MockOrchestrator::new().with_workload(BOT1, 5, current.checksum.clone());

    let outcome = deploy(&orch, &current, &policy(60)).await.unwrap();

    assert_eq!(outcome, DeployOutcome::Applied { ready: 2 });
}

#[tokio::test(start_paused = true)]
async fn failed_rollout_rolls_back_to_previous_revision() {
    let previous = release("v1", 1);
    let broken = release("v2", 1);
    let orch = MockOrchestrator::new()
        .with_workload(BOT1, 1, previous.checksum.clone())
        .with_failing_release(broken.checksum.clone());

    let err = deploy(&orch, &broken, &policy(120)).await.unwrap_err();

    match err {
        ReconcileError::RolloutFailed {
            identity,
            failed_instances,
            rolled_back,
        } => {
            assert_eq!(identity, BOT1);
            assert_eq!(failed_instances, vec!["tiksimpro-bot1-0".to_string()]);
            assert!(rolled_back);
        }
        other => panic!("unexpected error: {other}"),
    }

    let state = orch.snapshot(BOT1).unwrap();
    assert_eq!(state.checksum, Some(previous.checksum));
    assert_eq!(state.ready, 1);
    assert!(matches!(orch.calls().last(), Some(Call::Rollback(id)) if id == BOT1));
    assert!(!orch.calls().iter().any(|c| matches!(c, Call::Prune(_))));
}

#[tokio::test(start_paused = true)]
async fn rollback_that_does_not_settle_is_its_own_error() {
    let previous = release("v1", 1);
    let broken = release("v2", 1);
    let orch = MockOrchestrator::new()
        .with_workload(BOT1, 1, previous.checksum.clone())
        .with_failing_release(previous.checksum.clone())
        .with_failing_release(broken.checksum.clone());

    let started = tokio::time::Instant::now();
    let err = deploy(&orch, &broken, &policy(60)).await.unwrap_err();

    match err {
        ReconcileError::RollbackFailed {
            identity,
            failed_instances,
            not_ready,
        } => {
            assert_eq!(identity, BOT1);
            assert_eq!(failed_instances, vec!["tiksimpro-bot1-0"]);
            assert_eq!(not_ready, vec!["tiksimpro-bot1-0"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // One budget for the rollout, one for the rollback.
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert_eq!(orch.snapshot(BOT1).unwrap().checksum, Some(previous.checksum));
}

#[tokio::test(start_paused = true)]
async fn failed_first_rollout_is_reported_not_removed() {
    let broken = release("v1", 2);
    let orch = MockOrchestrator::new().with_failing_release(broken.checksum.clone());

    let err = deploy(&orch, &broken, &policy(30)).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::RolloutFailed { rolled_back: false, ref failed_instances, .. }
            if failed_instances.len() == 2
    ));
    assert!(!orch.calls().iter().any(|c| matches!(c, Call::Rollback(_))));
    assert_eq!(orch.snapshot(BOT1).unwrap().checksum, Some(broken.checksum));
}

#[tokio::test(start_paused = true)]
async fn scale_succeeds_when_instances_become_ready() {
    let orch = MockOrchestrator::new().with_workload(BOT1, 1, release("v1", 1).checksum);

    let outcome = scale(&orch, BOT1, 3, &policy(60)).await.unwrap();

    assert_eq!(outcome, ScaleOutcome { previous: 1, ready: 3 });
}

/// Scaling `bot1` to 3 with a 300 second budget when only 2 instances can
/// become ready.
#[tokio::test(start_paused = true)]
async fn scale_timeout_reports_last_known_good_and_keeps_request() {
    let orch = MockOrchestrator::new()
        .with_workload(BOT1, 1, release("v1", 1).checksum)
        .with_ready_cap(BOT1, 2);

    let started = tokio::time::Instant::now();
    let err = scale(&orch, BOT1, 3, &policy(300)).await.unwrap_err();

    match err {
        ReconcileError::ScaleTimeout {
            identity,
            requested,
            ready,
            last_known_good,
        } => {
            assert_eq!(identity, BOT1);
            assert_eq!(requested, 3);
            assert_eq!(ready, 2);
            assert_eq!(last_known_good, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(started.elapsed() >= Duration::from_secs(300));
    assert!(started.elapsed() < Duration::from_secs(310));

    // No automatic revert.
    assert_eq!(
        orch.calls(),
        vec![Call::SetReplicas {
            identity: BOT1.to_string(),
            replicas: 3,
        }]
    );
    assert_eq!(orch.snapshot(BOT1).unwrap().desired, 3);
}

#[rstest]
#[case(11)]
#[case(100)]
#[tokio::test(start_paused = true)]
async fn scale_rejects_counts_above_maximum(#[case] replicas: u32) {
    let orch = MockOrchestrator::new().with_workload(BOT1, 1, release("v1", 1).checksum);

    let err = scale(&orch, BOT1, replicas, &policy(60)).await.unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidReplicas { max: 10, .. }));
    assert!(orch.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scale_unknown_workload_is_not_found() {
    let orch = MockOrchestrator::new();
    let err = scale(&orch, BOT1, 2, &policy(60)).await.unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound(_)));
}

#[tokio::test]
async fn single_instance_resolution() {
    let one = MockOrchestrator::new().with_workload(BOT1, 1, release("v1", 1).checksum);
    let instance = resolve_single_instance(&one, BOT1, None).await.unwrap();
    assert_eq!(instance.name, "tiksimpro-bot1-0");

    let none = MockOrchestrator::new().with_workload(BOT1, 0, release("v1", 0).checksum);
    assert!(matches!(
        resolve_single_instance(&none, BOT1, None).await,
        Err(ReconcileError::NotFound(_))
    ));

    let many = MockOrchestrator::new().with_workload(BOT1, 3, release("v1", 3).checksum);
    match resolve_single_instance(&many, BOT1, None).await {
        Err(ReconcileError::Ambiguous { candidates, .. }) => {
            assert_eq!(
                candidates,
                vec!["tiksimpro-bot1-0", "tiksimpro-bot1-1", "tiksimpro-bot1-2"]
            );
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let picked = resolve_single_instance(&many, BOT1, Some("tiksimpro-bot1-2"))
        .await
        .unwrap();
    assert_eq!(picked.name, "tiksimpro-bot1-2");
    assert!(matches!(
        resolve_single_instance(&many, BOT1, Some("tiksimpro-bot1-7")).await,
        Err(ReconcileError::NotFound(_))
    ));
}
