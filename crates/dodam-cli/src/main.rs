//! Dodam chat CLI
//!
//! Drives the realtime chat client from the command line.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use dodam_core::RealtimeConfig;

mod cli;
mod config_handlers;
mod simulate;

use cli::{Args, Command};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info,dodam=debug" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Simulate(sim) => {
            let config = RealtimeConfig::load(args.config.as_deref())?;
            tracing::info!(
                room = %sim.room,
                messages = sim.messages,
                push_failures = sim.push_failures,
                stall_push = sim.stall_push,
                "Starting simulation"
            );
            let report = simulate::run(config, &sim).await?;
            simulate::print_report(&report, sim.json)
        }
        Command::Config { action } => {
            config_handlers::handle_config_command(args.config.as_deref(), action)
        }
    }
}
