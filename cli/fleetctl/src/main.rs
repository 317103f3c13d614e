//! fleetctl - CLI for tiksimpro bot fleets
//!
//! Validates and renders the fleet spec, and drives the cluster through
//! `kubectl`: deploy, update, scale, restart, logs, backup and shell.

use anyhow::Result;
use clap::Parser;

mod cluster;
mod commands;
mod config;
mod error;
mod kubectl;
mod output;
mod spec;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
