//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dodam chat - realtime delivery driver
#[derive(Parser, Debug)]
#[command(name = "dodam-chat", version)]
#[command(about = "Drive the Dodam realtime chat client", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, env = "DODAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the client against an in-memory hub and print what it delivers
    Simulate(SimulateArgs),

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Room to subscribe to
    #[arg(long, default_value = "general")]
    pub room: String,

    /// Messages to send once the room is delivering
    #[arg(long, default_value_t = 5)]
    pub messages: usize,

    /// Push opens to reject before the transport starts accepting
    #[arg(long, default_value_t = 0)]
    pub push_failures: usize,

    /// Push opens never confirm (exercises the probe timeout)
    #[arg(long)]
    pub stall_push: bool,

    /// Print a JSON report instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Print the resolved config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
