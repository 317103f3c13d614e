//! Plan command (dry run).

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use fleet_render::WorkloadDescriptor;

use crate::output::{print_output, print_single, OutputFormat};

use super::CommandContext;

/// Plan command - print workload descriptors without cluster access.
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Only this bot.
    #[arg(long)]
    bot: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    #[tabled(rename = "Bot")]
    bot: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Replicas")]
    replicas: u32,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Volumes")]
    volumes: String,
}

impl From<&WorkloadDescriptor> for PlanRow {
    fn from(d: &WorkloadDescriptor) -> Self {
        Self {
            bot: d.bot.to_string(),
            identity: d.identity.clone(),
            replicas: d.replicas,
            image: d.image.clone(),
            cpu: format!("{} / {}", d.resources.requests.cpu, d.resources.limits.cpu),
            memory: format!(
                "{} / {}",
                d.resources.requests.memory, d.resources.limits.memory
            ),
            volumes: d
                .volume_claims
                .iter()
                .map(|v| format!("{}={}", v.name, v.size))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl PlanCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;

        let descriptors: BTreeMap<&str, &WorkloadDescriptor> = prepared
            .select(self.bot.as_deref())?
            .into_iter()
            .map(|r| (r.descriptor.bot.as_str(), &r.descriptor))
            .collect();

        match ctx.format {
            OutputFormat::Json => print_single(&descriptors),
            OutputFormat::Table => {
                let rows: Vec<PlanRow> = descriptors.values().map(|d| PlanRow::from(*d)).collect();
                print_output(&rows, ctx.format);
            }
        }

        Ok(())
    }
}
