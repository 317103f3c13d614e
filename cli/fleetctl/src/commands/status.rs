//! Status command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use fleet_reconcile::{ConvergenceStatus, Orchestrator, SpecHash, WorkloadState};

use crate::output::print_output;

use super::CommandContext;

/// Status command - desired, ready and revision sync per bot.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only this bot.
    #[arg(long)]
    bot: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Bot")]
    bot: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Desired")]
    desired: u32,
    #[tabled(rename = "Ready")]
    ready: u32,
    #[tabled(rename = "Restarts")]
    restarts: u32,
    #[tabled(rename = "Status")]
    status: String,
}

fn status_of(state: Option<&WorkloadState>, checksum: &SpecHash) -> ConvergenceStatus {
    state.map_or(ConvergenceStatus::Unknown, |s| s.convergence(checksum))
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;
        let selected = prepared.select(self.bot.as_deref())?;
        let orch = ctx.connect(&prepared).await?;

        let mut rows = Vec::with_capacity(selected.len());
        for release in selected {
            let identity = &release.release.identity;
            let state = orch.workload(identity).await?;
            let restarts = match &state {
                Some(_) => orch
                    .instances(identity)
                    .await?
                    .iter()
                    .map(|i| i.restarts)
                    .sum(),
                None => 0,
            };

            let status = match status_of(state.as_ref(), &release.release.checksum) {
                ConvergenceStatus::Unknown => "not deployed".to_string(),
                ConvergenceStatus::Diverged => "out of date".to_string(),
                other => other.to_string(),
            };

            rows.push(StatusRow {
                bot: release.descriptor.bot.to_string(),
                identity: identity.clone(),
                desired: state.as_ref().map_or(0, |s| s.desired),
                ready: state.as_ref().map_or(0, |s| s.ready),
                restarts,
                status,
            });
        }

        print_output(&rows, ctx.format);
        Ok(())
    }
}
