//! CLI commands.

mod backup;
mod deploy;
mod logs;
mod plan;
mod render;
mod restart;
mod scale;
mod shell;
mod status;
mod update;
mod validate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use fleet_reconcile::WaitPolicy;
use fleet_spec::FleetSpec;
use tracing_subscriber::EnvFilter;

use crate::cluster::KubectlOrchestrator;
use crate::config::{Config, DEFAULT_SPEC_PATH};
use crate::kubectl::Kubectl;
use crate::output::{print_warning, OutputFormat};
use crate::spec::{self, Prepared};

/// fleetctl - Render, deploy and operate tiksimpro bot fleets.
#[derive(Debug, Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Fleet spec file.
    #[arg(long, global = true, env = "FLEET_SPEC")]
    spec: Option<PathBuf>,

    /// Namespace override.
    #[arg(long, global = true, env = "FLEET_NAMESPACE")]
    namespace: Option<String>,

    /// kubectl context.
    #[arg(long, global = true, env = "FLEET_KUBE_CONTEXT")]
    context: Option<String>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate the fleet spec and print its checksum.
    Validate(validate::ValidateCommand),

    /// Write rendered configs and manifests to a directory.
    Render(render::RenderCommand),

    /// Show planned workloads without touching the cluster.
    Plan(plan::PlanCommand),

    /// Deploy the fleet, or one bot.
    Deploy(deploy::DeployCommand),

    /// Roll out a new image tag, optionally building it first.
    Update(update::UpdateCommand),

    /// Show desired and ready instances per bot.
    Status(status::StatusCommand),

    /// Show bot logs.
    Logs(logs::LogsCommand),

    /// Restart one bot or the whole fleet.
    Restart(restart::RestartCommand),

    /// Change a bot's replica count.
    Scale(scale::ScaleCommand),

    /// Snapshot the spec, rendered artifacts and non-secret cluster objects.
    Backup(backup::BackupCommand),

    /// Open a shell in a bot instance.
    Shell(shell::ShellCommand),
}

impl Cli {
    /// Install the stderr log subscriber.
    pub fn init_logging(&self) {
        let default = match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;

        let ctx = CommandContext {
            spec_path: self
                .spec
                .or_else(|| config.spec.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SPEC_PATH)),
            namespace: self.namespace.or_else(|| config.namespace.clone()),
            kube_context: self.context.or_else(|| config.kube_context.clone()),
            format: self.format,
            config,
        };

        match self.command {
            Commands::Validate(cmd) => cmd.run(ctx).await,
            Commands::Render(cmd) => cmd.run(ctx).await,
            Commands::Plan(cmd) => cmd.run(ctx).await,
            Commands::Deploy(cmd) => cmd.run(ctx).await,
            Commands::Update(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Logs(cmd) => cmd.run(ctx).await,
            Commands::Restart(cmd) => cmd.run(ctx).await,
            Commands::Scale(cmd) => cmd.run(ctx).await,
            Commands::Backup(cmd) => cmd.run(ctx).await,
            Commands::Shell(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub spec_path: PathBuf,
    pub namespace: Option<String>,
    pub kube_context: Option<String>,
}

impl CommandContext {
    /// Read the spec, applying the namespace override.
    pub fn load_spec(&self) -> Result<FleetSpec> {
        let mut spec = spec::load(&self.spec_path)?;
        if let Some(namespace) = &self.namespace {
            spec.fleet.namespace = Some(namespace.clone());
        }
        Ok(spec)
    }

    /// Validate and render; warnings go to stderr.
    pub fn prepare(&self, spec: FleetSpec) -> Result<Prepared> {
        let prepared = Prepared::new(spec)?;
        for warning in &prepared.fleet.warnings {
            print_warning(&warning.to_string());
        }
        Ok(prepared)
    }

    pub fn load_prepared(&self) -> Result<Prepared> {
        self.prepare(self.load_spec()?)
    }

    /// Check prerequisites and return an orchestrator for the fleet's
    /// namespace. Nothing is mutated before this succeeds.
    pub async fn connect(&self, prepared: &Prepared) -> Result<Arc<KubectlOrchestrator>> {
        let kubectl = Kubectl::new(self.kube_context.clone(), prepared.namespace());
        kubectl.check_prerequisites().await?;
        Ok(Arc::new(KubectlOrchestrator::new(kubectl)))
    }

    /// Wait policy from `--timeout`, falling back to the config.
    pub fn wait_policy(&self, timeout_seconds: Option<u64>) -> WaitPolicy {
        WaitPolicy {
            timeout: timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.config.timeout()),
            poll_interval: self.config.poll_interval(),
        }
    }
}
