//! Error handling and display for the CLI.

use colored::Colorize;
use fleet_reconcile::ReconcileError;
use fleet_spec::SpecValidationError;
use thiserror::Error;

/// Failure classes, each fatal with exit code 1.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The fleet spec is malformed or inconsistent. Nothing was changed.
    #[error("Invalid fleet spec: {0}")]
    SpecValidation(#[from] SpecValidationError),

    /// A required tool is missing or the cluster is unreachable. Nothing
    /// was changed.
    #[error("Environment not ready: {0}")]
    Environment(String),

    /// The cluster accepted a release but it did not become ready.
    #[error("Deployment failed: {}", summarize(.0))]
    Deployment(Vec<ReconcileError>),

    /// A management action targets a bot or instance that does not exist
    /// or is ambiguous.
    #[error("{0}")]
    Operational(String),
}

fn summarize(failures: &[ReconcileError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ReconcileError> for FleetError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::NotFound(_)
            | ReconcileError::Ambiguous { .. }
            | ReconcileError::InvalidReplicas { .. } => Self::Operational(err.to_string()),
            ReconcileError::Orchestrator(e) => Self::Environment(format!("{e:#}")),
            ReconcileError::RolloutFailed { .. }
            | ReconcileError::RollbackFailed { .. }
            | ReconcileError::ScaleTimeout { .. } => Self::Deployment(vec![err]),
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let Some(fleet_err) = err.downcast_ref::<FleetError>() else {
        return;
    };

    match fleet_err {
        FleetError::SpecValidation(spec_err) => {
            if let Some(bot) = spec_err.bot_name() {
                eprintln!("  bot:   {bot}");
            }
            if let Some(field) = spec_err.field() {
                eprintln!("  field: {field}");
            }
            eprintln!(
                "\n{}",
                "Hint: Fix the spec and re-run `fleetctl validate`. Nothing was applied.".yellow()
            );
        }
        FleetError::Environment(_) => {
            eprintln!(
                "\n{}",
                "Hint: Check that kubectl is installed and the selected context is reachable."
                    .yellow()
            );
        }
        FleetError::Deployment(failures) => {
            for failure in failures {
                if let ReconcileError::RolloutFailed {
                    identity,
                    failed_instances,
                    rolled_back,
                } = failure
                {
                    eprintln!("  {identity}: not ready: {}", failed_instances.join(", "));
                    if *rolled_back {
                        eprintln!("  {identity}: previous revision restored");
                    }
                }
                if let ReconcileError::RollbackFailed {
                    identity,
                    failed_instances,
                    not_ready,
                } = failure
                {
                    eprintln!("  {identity}: not ready: {}", failed_instances.join(", "));
                    eprintln!(
                        "  {identity}: rolled back, but still not ready: {}",
                        not_ready.join(", ")
                    );
                }
                if let ReconcileError::ScaleTimeout {
                    identity,
                    last_known_good,
                    ..
                } = failure
                {
                    eprintln!("  {identity}: last known good replica count is {last_known_good}");
                }
            }
            eprintln!(
                "\n{}",
                "Hint: Inspect the instances with `fleetctl status` and `fleetctl logs --bot <bot>`."
                    .yellow()
            );
        }
        FleetError::Operational(_) => {
            eprintln!(
                "\n{}",
                "Hint: `fleetctl status` lists deployed bots and their instances.".yellow()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_errors_map_to_failure_classes() {
        let not_found: FleetError = ReconcileError::NotFound("tiksimpro-bot9".into()).into();
        assert!(matches!(not_found, FleetError::Operational(_)));

        let ambiguous: FleetError = ReconcileError::Ambiguous {
            identity: "tiksimpro-bot1".into(),
            candidates: vec!["tiksimpro-bot1-0".into(), "tiksimpro-bot1-1".into()],
        }
        .into();
        assert!(matches!(ambiguous, FleetError::Operational(_)));

        let timeout: FleetError = ReconcileError::ScaleTimeout {
            identity: "tiksimpro-bot1".into(),
            requested: 3,
            ready: 2,
            last_known_good: 1,
        }
        .into();
        assert!(matches!(&timeout, FleetError::Deployment(f) if f.len() == 1));

        let stalled_rollback: FleetError = ReconcileError::RollbackFailed {
            identity: "tiksimpro-bot1".into(),
            failed_instances: vec!["tiksimpro-bot1-0".into()],
            not_ready: vec!["tiksimpro-bot1-0".into()],
        }
        .into();
        assert!(matches!(stalled_rollback, FleetError::Deployment(_)));

        let unreachable: FleetError =
            ReconcileError::Orchestrator(anyhow::anyhow!("connection refused")).into();
        assert!(matches!(unreachable, FleetError::Environment(ref m) if m.contains("refused")));
    }

    #[test]
    fn deployment_message_lists_every_failure() {
        let err = FleetError::Deployment(vec![
            ReconcileError::NotFound("a".into()),
            ReconcileError::NotFound("b".into()),
        ]);
        let message = err.to_string();
        assert!(message.starts_with("Deployment failed: "));
        assert!(message.contains("; "));
    }
}
