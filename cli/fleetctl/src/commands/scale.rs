//! Scale command (set a bot's replica count).

use anyhow::Result;
use clap::Args;

use fleet_reconcile::{scale, ReconcileError};
use fleet_spec::MAX_REPLICAS;

use crate::error::FleetError;
use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Scale command - change the replica count and wait for readiness.
#[derive(Debug, Args)]
pub struct ScaleCommand {
    /// Bot name.
    bot: String,

    /// Target replica count (0-10).
    replicas: u32,

    /// Seconds to wait for the instances to become ready.
    #[arg(long)]
    timeout: Option<u64>,
}

fn check_replicas(replicas: u32) -> Result<(), FleetError> {
    if replicas > MAX_REPLICAS {
        return Err(ReconcileError::InvalidReplicas {
            requested: replicas,
            max: MAX_REPLICAS,
        }
        .into());
    }
    Ok(())
}

impl ScaleCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        check_replicas(self.replicas)?;

        let prepared = ctx.load_prepared()?;
        let release = prepared.release(&self.bot)?;
        let identity = release.release.identity.clone();
        let declared = release.descriptor.replicas;

        let orch = ctx.connect(&prepared).await?;
        let outcome = scale(
            orch.as_ref(),
            &identity,
            self.replicas,
            &ctx.wait_policy(self.timeout),
        )
        .await
        .map_err(FleetError::from)?;

        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({
                "identity": identity,
                "previous": outcome.previous,
                "replicas": self.replicas,
                "ready": outcome.ready,
            })),
            OutputFormat::Table => print_success(&format!(
                "Scaled {identity} from {} to {} ({} ready)",
                outcome.previous, self.replicas, outcome.ready
            )),
        }
        if declared != self.replicas {
            print_info(&format!(
                "The fleet spec declares {declared} replica(s) for {}; the next deploy restores that",
                self.bot
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_range() {
        assert!(check_replicas(0).is_ok());
        assert!(check_replicas(10).is_ok());
        assert!(matches!(
            check_replicas(11),
            Err(FleetError::Operational(message)) if message.contains("maximum of 10")
        ));
    }
}
