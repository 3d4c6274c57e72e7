//! Main entry point for the pasv CLI.
//!
//! Commands:
//! - `reserve`: Find a free block of consecutive ports
//! - `scan`: Show bound ports and free runs in a window
//! - `wait`: Wait until a service answers a readiness probe
//! - `run`: Run a command with a reserved block exported
//! - `validate`, `show-config`, `completions`

mod cli;
mod commands;
mod error;
mod utils;

use clap::Parser;
use cli::Cli;
use utils::GlobalOptions;

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let _logger = pasv::init_logger(cli.verbose, cli.quiet);

    let global = GlobalOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        data_dir: cli.data_dir,
    };

    let result = match cli.command {
        cli::Command::Reserve(cmd) => cmd.execute(&global),
        cli::Command::Scan(cmd) => cmd.execute(&global),
        cli::Command::Wait(cmd) => cmd.execute(&global),
        cli::Command::Run(cmd) => cmd.execute(&global),
        cli::Command::Validate(cmd) => cmd.execute(&global),
        cli::Command::ShowConfig(cmd) => cmd.execute(&global),
        cli::Command::Completions(cmd) => cmd.execute(&global),
    };

    // Handle errors and set exit code
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if e.should_report() {
                eprintln!("Error: {e}");
            }
            std::process::exit(e.exit_code());
        }
    }
}
