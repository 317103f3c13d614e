//! Shell command (interactive exec into one instance).

use anyhow::Result;
use clap::Args;

use fleet_reconcile::resolve_single_instance;

use crate::error::FleetError;
use crate::output::print_info;

use super::CommandContext;

/// Shell command - attach to exactly one running instance of a bot.
#[derive(Debug, Args)]
pub struct ShellCommand {
    /// Bot name.
    bot: String,

    /// Instance name, required when the bot runs more than one.
    #[arg(long, short)]
    instance: Option<String>,

    /// Command to run.
    #[arg(long, default_value = "/bin/sh")]
    command: String,
}

impl ShellCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;
        let identity = prepared.release(&self.bot)?.release.identity.clone();

        let orch = ctx.connect(&prepared).await?;
        let instance = resolve_single_instance(orch.as_ref(), &identity, self.instance.as_deref())
            .await
            .map_err(FleetError::from)?;
        if !instance.ready {
            print_info(&format!("{} is not ready", instance.name));
        }

        let status = orch
            .kubectl()
            .attached([
                "exec",
                "-it",
                instance.name.as_str(),
                "--",
                self.command.as_str(),
            ])
            .await?;
        if !status.success() {
            anyhow::bail!("shell in {} exited with {status}", instance.name);
        }
        Ok(())
    }
}
