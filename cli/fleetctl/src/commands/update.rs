//! Update command (new image tag, optional build).

use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use fleet_reconcile::Release;

use crate::error::FleetError;
use crate::kubectl::{require_tool, run_tool};
use crate::output::{print_info, print_success};
use crate::spec::image_with_tag;

use super::deploy::deploy_releases;
use super::CommandContext;

/// Update command - roll the whole fleet to a new image tag.
#[derive(Debug, Args)]
pub struct UpdateCommand {
    /// Image tag to roll out.
    #[arg(long)]
    tag: String,

    /// Build and push the image before deploying.
    #[arg(long)]
    build: bool,

    /// Docker build context.
    #[arg(long, default_value = ".")]
    context_dir: PathBuf,

    /// Seconds to wait for each bot to become ready.
    #[arg(long)]
    timeout: Option<u64>,
}

impl UpdateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let mut spec = ctx.load_spec()?;
        let image = image_with_tag(&spec.fleet.image, &self.tag)?;
        spec.fleet.image = image.clone();

        let prepared = ctx.prepare(spec)?;
        let releases: Vec<Release> = prepared
            .releases
            .values()
            .map(|r| r.release.clone())
            .collect();

        let orch = ctx.connect(&prepared).await?;
        if self.build {
            require_tool("docker", &["version", "--format", "{{.Client.Version}}"]).await?;
            if !self.context_dir.is_dir() {
                return Err(FleetError::Environment(format!(
                    "build context {:?} is not a directory",
                    self.context_dir
                ))
                .into());
            }

            print_info(&format!("Building {image}"));
            let build_args = [
                OsStr::new("build"),
                OsStr::new("-t"),
                OsStr::new(&image),
                self.context_dir.as_os_str(),
            ];
            run_tool("docker", build_args).await?;
            run_tool("docker", ["push", image.as_str()]).await?;
        }

        orch.kubectl().ensure_namespace().await?;
        deploy_releases(orch, releases, ctx.wait_policy(self.timeout), ctx.format).await?;

        print_success(&format!("Fleet running {image}"));
        print_info(&format!(
            "Set fleet.image = \"{image}\" in {:?} so later deploys keep this tag",
            ctx.spec_path
        ));
        Ok(())
    }
}
