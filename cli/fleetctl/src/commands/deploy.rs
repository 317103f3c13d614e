//! Deploy command (apply releases and wait for readiness).

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tokio::task::JoinHandle;
use tracing::info;

use fleet_reconcile::{deploy, DeployOutcome, ReconcileError, Release, WaitPolicy};

use crate::cluster::KubectlOrchestrator;
use crate::error::FleetError;
use crate::output::{print_output, OutputFormat};

use super::CommandContext;

/// Deploy command - roll every enabled bot (or one) to the rendered spec.
#[derive(Debug, Args)]
pub struct DeployCommand {
    /// Only this bot.
    #[arg(long)]
    bot: Option<String>,

    /// Seconds to wait for each bot to become ready.
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Serialize, Tabled)]
struct DeployRow {
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "Checksum")]
    checksum: String,
}

impl DeployCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prepared = ctx.load_prepared()?;
        let releases: Vec<Release> = prepared
            .select(self.bot.as_deref())?
            .into_iter()
            .map(|r| r.release.clone())
            .collect();

        let orch = ctx.connect(&prepared).await?;
        orch.kubectl().ensure_namespace().await?;

        deploy_releases(orch, releases, ctx.wait_policy(self.timeout), ctx.format).await
    }
}

type DeployResult = Result<DeployOutcome, ReconcileError>;

/// Deploy releases concurrently, one task per bot; report every outcome
/// and fail if any bot failed.
pub(super) async fn deploy_releases(
    orch: Arc<KubectlOrchestrator>,
    releases: Vec<Release>,
    policy: WaitPolicy,
    format: OutputFormat,
) -> Result<()> {
    let tasks = releases
        .into_iter()
        .map(|release| {
            let orch = Arc::clone(&orch);
            let task_release = release.clone();
            let task = tokio::spawn(async move {
                deploy(orch.as_ref(), &task_release, &policy).await
            });
            (release, task)
        })
        .collect();

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for (release, outcome) in join_deploys(tasks).await {
        rows.push(deploy_row(&release, &outcome));
        if let Err(e) = outcome {
            failures.push(e);
        }
    }
    rows.sort_by(|a, b| a.identity.cmp(&b.identity));
    print_output(&rows, format);

    if !failures.is_empty() {
        return Err(FleetError::Deployment(failures).into());
    }
    info!(bots = rows.len(), "deploy complete");
    Ok(())
}

/// Wait for every deploy task. A task that panicked or was cancelled
/// becomes that bot's failure; the other bots still report.
async fn join_deploys(
    tasks: Vec<(Release, JoinHandle<DeployResult>)>,
) -> Vec<(Release, DeployResult)> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    for (release, task) in tasks {
        let outcome = task.await.unwrap_or_else(|e| {
            Err(ReconcileError::Orchestrator(anyhow!(
                "deploy task for {} failed: {e}",
                release.identity
            )))
        });
        outcomes.push((release, outcome));
    }
    outcomes
}

fn deploy_row(release: &Release, outcome: &DeployResult) -> DeployRow {
    let (result, ready) = match outcome {
        Ok(DeployOutcome::Unchanged { ready }) => ("unchanged".to_string(), ready.to_string()),
        Ok(DeployOutcome::Applied { ready }) => ("applied".to_string(), ready.to_string()),
        Err(ReconcileError::RolloutFailed { rolled_back, .. }) => (
            if *rolled_back {
                "failed, rolled back".to_string()
            } else {
                "failed".to_string()
            },
            "-".to_string(),
        ),
        Err(ReconcileError::RollbackFailed { .. }) => {
            ("failed, rollback not settled".to_string(), "-".to_string())
        }
        Err(_) => ("error".to_string(), "-".to_string()),
    };

    DeployRow {
        identity: release.identity.clone(),
        result,
        ready: format!("{ready}/{}", release.replicas),
        checksum: release.checksum.short().to_string(),
    }
}
