//! Restart command.

use anyhow::Result;
use clap::Args;

use fleet_reconcile::{Orchestrator, ReconcileError};

use crate::error::FleetError;
use crate::output::print_success;

use super::CommandContext;

/// Restart command - recreate instances in place, keeping volumes.
#[derive(Debug, Args)]
pub struct RestartCommand {
    /// Only this bot; otherwise the whole fleet.
    #[arg(long)]
    bot: Option<String>,
}

impl RestartCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;
        let selected = prepared.select(self.bot.as_deref())?;
        let orch = ctx.connect(&prepared).await?;

        // Every target must exist before any restart is issued.
        for release in &selected {
            let identity = &release.release.identity;
            if orch.workload(identity).await?.is_none() {
                return Err(FleetError::from(ReconcileError::NotFound(identity.clone())).into());
            }
        }

        for release in &selected {
            orch.restart(&release.release.identity).await?;
            print_success(&format!("Restarting {}", release.release.identity));
        }

        Ok(())
    }
}
