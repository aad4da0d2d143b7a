//! CLI module for failoverd
//!
//! Provides command-line interface for:
//! - validate: load and check a configuration file
//! - simulate: run the control loop against a simulated cluster

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, SimulateArgs};
pub use commands::{run, run_command, simulate, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
