//! Command to run a child process with a reserved block.
//!
//! The block is exported as `PASV_PORT_START`, `PASV_PORT_END` and
//! `PASV_PORT_COUNT`, held for the life of the child and released when it
//! exits. The child's exit code becomes ours.

use std::process::{Command, ExitStatus};
use std::sync::Arc;

use clap::Args;

use pasv::{allocator_from_config, Config, PortRange, ReservationRegistry};

use crate::commands::deadline_token;
use crate::error::CliError;
use crate::utils::{apply_window_flags, load_configuration, GlobalOptions};

/// Run a command with a reserved block exported.
#[derive(Args)]
pub struct RunCommand {
    /// Ports in the block (default: configured block size)
    #[arg(long, short = 'n', value_name = "COUNT")]
    pub count: Option<u16>,

    /// First port of the window to search
    #[arg(long, value_name = "PORT")]
    pub start: Option<u16>,

    /// Last port of the window to search
    #[arg(long, value_name = "PORT")]
    pub end: Option<u16>,

    /// Give up reserving after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Command and arguments to run
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl RunCommand {
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| CliError::InvalidArguments("no command given".into()))?;

        let mut config = load_configuration(global, Config::default())?;
        apply_window_flags(self.start, self.end, &mut config);

        let count = self.count.unwrap_or_else(|| config.block_size());
        let allocator = allocator_from_config(&config, Arc::new(ReservationRegistry::new()))
            .map_err(|e| CliError::InvalidArguments(e.to_string()))?;
        let lease = allocator.lease(count, &deadline_token(self.timeout))?;
        let block = lease.block();

        if global.verbose {
            eprintln!("Running {program} with ports {block}");
        }
        let status = Command::new(program)
            .args(args)
            .envs(block_env(block))
            .status();

        let released = lease.release();
        log::debug!("released {released} port(s) after child exit");

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(CliError::ChildExited(exit_code(status)))
        }
    }
}

/// Environment variables describing `block`.
pub fn block_env(block: PortRange) -> [(&'static str, String); 3] {
    [
        ("PASV_PORT_START", block.start().value().to_string()),
        ("PASV_PORT_END", block.end().value().to_string()),
        ("PASV_PORT_COUNT", block.len().to_string()),
    ]
}

/// The code to exit with for a child's status. Signals map to `128 + n`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
