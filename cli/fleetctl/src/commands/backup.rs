//! Backup command (non-secret metadata snapshot).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use fleet_render::fleet_checksum;
use fleet_render::workload::LABEL_PART_OF;

use crate::output::{print_single, print_success, OutputFormat};
use crate::spec::write_artifacts;

use super::CommandContext;

/// Kinds captured from the cluster. Secrets are never included.
const CLUSTER_KINDS: &str = "statefulsets,services,configmaps,persistentvolumeclaims";

/// Backup command - spec, rendered artifacts, cluster objects, checksums.
#[derive(Debug, Args)]
pub struct BackupCommand {
    /// Backup directory; defaults to `<backup_dir>/<fleet>-<timestamp>`.
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Skip the cluster snapshot.
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Serialize)]
struct BackupManifest {
    created_at: DateTime<Utc>,
    fleet: String,
    namespace: String,
    fleet_checksum: String,
    spec_file: PathBuf,
    cluster_snapshot: bool,
}

fn default_dir(parent: &Path, fleet: &str, now: DateTime<Utc>) -> PathBuf {
    parent.join(format!("{fleet}-{}", now.format("%Y%m%dT%H%M%SZ")))
}

impl BackupCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;
        let now = Utc::now();
        let dir = self
            .out
            .unwrap_or_else(|| default_dir(&ctx.config.backup_dir(), prepared.fleet_name(), now));

        // Cluster state is read before anything is written.
        let cluster = if self.offline {
            None
        } else {
            let orch = ctx.connect(&prepared).await?;
            let selector = format!("{LABEL_PART_OF}={}", prepared.fleet_name());
            let objects = orch
                .kubectl()
                .output(["get", CLUSTER_KINDS, "-l", selector.as_str(), "-o", "yaml"])
                .await?;
            Some(objects)
        };

        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        fs::copy(&ctx.spec_path, dir.join("fleet.toml"))
            .with_context(|| format!("Failed to copy {:?}", ctx.spec_path))?;
        write_artifacts(&dir.join("rendered"), &prepared)?;
        if let Some(objects) = &cluster {
            fs::write(dir.join("cluster.yaml"), objects)?;
        }

        let manifest = BackupManifest {
            created_at: now,
            fleet: prepared.fleet_name().to_string(),
            namespace: prepared.namespace().to_string(),
            fleet_checksum: fleet_checksum(&prepared.releases).to_string(),
            spec_file: ctx.spec_path.clone(),
            cluster_snapshot: cluster.is_some(),
        };
        fs::write(
            dir.join("backup.json"),
            serde_json::to_string_pretty(&manifest)? + "\n",
        )?;

        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({
                "dir": dir,
                "manifest": manifest,
            })),
            OutputFormat::Table => print_success(&format!("Backup written to {:?}", dir)),
        }
        Ok(())
    }
}
