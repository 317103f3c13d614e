//! Validate command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use fleet_render::fleet_checksum;

use crate::output::{print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Validate command - resolve the spec and report what would be deployed.
#[derive(Debug, Args)]
pub struct ValidateCommand {}

#[derive(Debug, Serialize, Tabled)]
struct BotRow {
    #[tabled(rename = "Bot")]
    bot: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Replicas")]
    replicas: u32,
    #[tabled(rename = "Platforms")]
    platforms: String,
    #[tabled(rename = "Checksum")]
    checksum: String,
}

#[derive(Debug, Serialize)]
struct ValidateResult<'a> {
    fleet: &'a str,
    namespace: &'a str,
    fleet_checksum: String,
    bots: Vec<BotRow>,
    warnings: Vec<String>,
}

impl ValidateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;

        let bots: Vec<BotRow> = prepared
            .fleet
            .bots
            .iter()
            .filter_map(|bot| {
                let release = prepared.releases.get(&bot.name)?;
                Some(BotRow {
                    bot: bot.name.to_string(),
                    identity: bot.identity.clone(),
                    replicas: bot.replicas,
                    platforms: bot.platforms.keys().cloned().collect::<Vec<_>>().join(", "),
                    checksum: release.release.checksum.short().to_string(),
                })
            })
            .collect();
        let checksum = fleet_checksum(&prepared.releases);

        match ctx.format {
            OutputFormat::Json => print_single(&ValidateResult {
                fleet: prepared.fleet_name(),
                namespace: prepared.namespace(),
                fleet_checksum: checksum.to_string(),
                bots,
                warnings: prepared.fleet.warnings.iter().map(ToString::to_string).collect(),
            }),
            OutputFormat::Table => {
                print_output(&bots, ctx.format);
                print_success(&format!(
                    "Fleet spec {:?} is valid: {} enabled bot(s), checksum {}",
                    ctx.spec_path,
                    bots.len(),
                    checksum
                ));
            }
        }

        Ok(())
    }
}
