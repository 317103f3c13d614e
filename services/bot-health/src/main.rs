//! bot-healthcheck - probe entry point for bot instances.
//!
//! Invoked by the orchestrator's exec probes and by the worker itself to
//! publish readiness. Probe reasons go to stdout; diagnostics go to stderr
//! as JSON.

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use bot_health::{marker, run_probe, HealthConfig, Probe};
use clap::{Parser, Subcommand};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bot-healthcheck", version, about = "Health gate for bot instances")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Main loop running and working directories writable.
    Startup,
    /// Startup checks plus disk and memory ceilings.
    Liveness,
    /// Readiness marker present.
    Readiness,
    /// Write the readiness marker.
    MarkReady,
    /// Remove the readiness marker.
    ClearReady,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "health check could not run");
            println!("FAIL {e}");
            ExitCode::from(1)
        }
    }
}

fn run(command: Command) -> Result<bool> {
    let config = HealthConfig::from_env()?;
    debug!(?config, "health config loaded");

    let probe = match command {
        Command::Startup => Probe::Startup,
        Command::Liveness => Probe::Liveness,
        Command::Readiness => Probe::Readiness,
        Command::MarkReady => {
            marker::mark_ready(&config.ready_marker)?;
            return Ok(true);
        }
        Command::ClearReady => {
            marker::clear_ready(&config.ready_marker)?;
            return Ok(true);
        }
    };

    let report = run_probe(probe, &config);
    report.write_to(&mut io::stdout().lock())?;

    let healthy = report.healthy();
    if !healthy {
        for failure in report.failures() {
            warn!(probe = %probe, check = failure.check, detail = %failure.detail, "check failed");
        }
    }
    Ok(healthy)
}
