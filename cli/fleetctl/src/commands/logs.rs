//! Logs command (view bot logs).

use anyhow::Result;
use clap::Args;

use fleet_render::workload::{LABEL_INSTANCE, LABEL_PART_OF};

use crate::error::FleetError;
use crate::kubectl::Kubectl;

use super::CommandContext;

pub const MAX_TAIL_LINES: u32 = 10_000;

/// Logs command - view bot logs.
#[derive(Debug, Args)]
pub struct LogsCommand {
    /// Only this bot; otherwise the whole fleet.
    #[arg(long, short)]
    bot: Option<String>,

    /// Follow logs in real-time.
    #[arg(long, short)]
    follow: bool,

    /// Lines per instance (1-10000).
    #[arg(long, short, default_value = "100")]
    tail: u32,
}

fn check_tail(tail: u32) -> Result<(), FleetError> {
    if (1..=MAX_TAIL_LINES).contains(&tail) {
        Ok(())
    } else {
        Err(FleetError::Operational(format!(
            "--tail must be between 1 and {MAX_TAIL_LINES}, got {tail}"
        )))
    }
}

fn logs_args(selector: &str, tail: u32, follow: bool) -> Vec<String> {
    let mut args = vec![
        "logs".to_string(),
        "-l".to_string(),
        selector.to_string(),
        format!("--tail={tail}"),
        "--prefix".to_string(),
        "--max-log-requests=50".to_string(),
    ];
    if follow {
        args.push("--follow".to_string());
    }
    args
}

impl LogsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        check_tail(self.tail)?;
        let prepared = ctx.load_prepared()?;

        let selector = match self.bot.as_deref() {
            Some(bot) => format!("{LABEL_INSTANCE}={}", prepared.release(bot)?.release.identity),
            None => format!("{LABEL_PART_OF}={}", prepared.fleet_name()),
        };

        let kubectl = Kubectl::new(ctx.kube_context.clone(), prepared.namespace());
        kubectl.check_prerequisites().await?;

        let status = kubectl
            .attached(logs_args(&selector, self.tail, self.follow))
            .await?;
        if !status.success() {
            anyhow::bail!("kubectl logs exited with {status}");
        }
        Ok(())
    }
}
