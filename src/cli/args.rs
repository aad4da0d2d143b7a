//! CLI argument definitions using clap
//!
//! Commands:
//! - failoverd validate --config <path>
//! - failoverd simulate --config <path> [--fail-primary-after-secs N] [--duration-secs N] [--port P]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::LogFormat;

/// failoverd - automatic failover for a statically configured replica set
#[derive(Parser, Debug)]
#[command(name = "failoverd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level or filter directive; overrides `logging.level`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (compact | json); overrides `logging.format`
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration file and print its topology
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./failoverd.json")]
        config: PathBuf,
    },

    /// Run the control loop against an in-memory simulated cluster
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Path to configuration file
    #[arg(long, default_value = "./failoverd.json")]
    pub config: PathBuf,

    /// Make the primary unreachable after this many seconds
    #[arg(long)]
    pub fail_primary_after_secs: Option<u64>,

    /// Stop the simulation after this many seconds
    #[arg(long, default_value_t = 60)]
    pub duration_secs: u64,

    /// Serve the reporting API on this port; overrides `http.port`
    #[arg(long)]
    pub port: Option<u16>,

    /// Random-walk standby lag by up to this many seconds per interval
    #[arg(long)]
    pub lag_drift: Option<f64>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
