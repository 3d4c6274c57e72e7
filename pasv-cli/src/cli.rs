//! CLI structure and command definitions.
//!
//! This module defines the main CLI structure using clap's derive macros,
//! including global options and subcommands.

use crate::commands::{
    CompletionsCommand, ReserveCommand, RunCommand, ScanCommand, ShowConfigCommand,
    ValidateCommand, WaitCommand,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reserve consecutive free ports and wait for test servers to come up.
#[derive(Parser)]
#[command(name = "pasv")]
#[command(
    version,
    about = "Reserve passive-port blocks and wait for test servers",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Override the data directory location
    #[arg(long, value_name = "PATH", global = true, env = "PASV_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Command {
    /// Find a free block of consecutive ports
    Reserve(ReserveCommand),

    /// Show bound ports and free runs in a window
    Scan(ScanCommand),

    /// Wait until a service answers a readiness probe
    Wait(WaitCommand),

    /// Run a command with a reserved block exported
    Run(RunCommand),

    /// Validate a configuration file
    Validate(ValidateCommand),

    /// Print the effective configuration
    ShowConfig(ShowConfigCommand),

    /// Generate shell completion scripts
    Completions(CompletionsCommand),
}
