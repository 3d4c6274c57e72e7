//! CLI command implementations.
//!
//! - `reserve`: Find a free block of consecutive ports
//! - `scan`: Show bound ports and free runs in a window
//! - `wait`: Wait until a service answers a readiness probe
//! - `run`: Run a command with a reserved block exported
//! - `validate`: Validate a configuration file
//! - `show_config`: Print the effective configuration
//! - `completions`: Generate shell completion scripts

pub mod completions;
pub mod reserve;
pub mod run;
pub mod scan;
pub mod show_config;
pub mod validate;
pub mod wait;

pub use completions::CompletionsCommand;
pub use reserve::ReserveCommand;
pub use run::RunCommand;
pub use scan::ScanCommand;
pub use show_config::ShowConfigCommand;
pub use validate::ValidateCommand;
pub use wait::WaitCommand;

use std::time::Duration;

use pasv::CancelToken;

/// A cancel token that fires after `seconds`, or never.
pub(crate) fn deadline_token(seconds: Option<u64>) -> CancelToken {
    seconds.map_or_else(CancelToken::new, |secs| {
        CancelToken::with_timeout(Duration::from_secs(secs))
    })
}
