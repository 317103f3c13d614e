//! Render command (write artifacts to disk).

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::output::{print_single, print_success, OutputFormat};
use crate::spec::write_artifacts;

use super::CommandContext;

/// Render command - write each bot's config document and manifests.
#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Output directory.
    #[arg(long, short, default_value = "rendered")]
    out: PathBuf,
}

impl RenderCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;
        let written = write_artifacts(&self.out, &prepared)?;

        match ctx.format {
            OutputFormat::Json => print_single(&json!({
                "out": self.out,
                "bots": prepared.releases.len(),
                "files": written,
            })),
            OutputFormat::Table => print_success(&format!(
                "Rendered {} bot(s) into {:?} ({} files)",
                prepared.releases.len(),
                self.out,
                written.len()
            )),
        }

        Ok(())
    }
}
