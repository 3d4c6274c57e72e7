//! Reserve command implementation.
//!
//! Finds a block of consecutive ports that nothing on the host is listening
//! on and prints it. The registry lives only as long as this process, so the
//! block is guaranteed free at the moment of the claim and no longer; callers
//! that need the ports held should use `pasv run`.

use std::sync::Arc;

use clap::{Args, ValueEnum};
use serde::Serialize;

use pasv::{allocator_from_config, Config, PortRange, ReservationRegistry};

use crate::commands::deadline_token;
use crate::error::CliError;
use crate::utils::{apply_window_flags, load_configuration, GlobalOptions};

/// Find a free block of consecutive ports.
#[derive(Args)]
pub struct ReserveCommand {
    /// Ports in the block (default: configured block size)
    #[arg(long, short = 'n', value_name = "COUNT")]
    pub count: Option<u16>,

    /// First port of the window to search
    #[arg(long, value_name = "PORT")]
    pub start: Option<u16>,

    /// Last port of the window to search
    #[arg(long, value_name = "PORT")]
    pub end: Option<u16>,

    /// Treat every port as unbound
    #[arg(long)]
    pub skip_occupancy_check: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReserveOutputFormat,
}

/// How the reserved block is printed.
#[derive(Clone, Copy, ValueEnum)]
pub enum ReserveOutputFormat {
    /// `start-end`
    Text,
    /// JSON object
    Json,
    /// YAML mapping
    Yaml,
}

/// Serialized form of a reserved block.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReservedBlock {
    /// First port.
    pub start: u16,
    /// Last port.
    pub end: u16,
    /// Number of ports.
    pub count: u32,
}

impl From<PortRange> for ReservedBlock {
    fn from(block: PortRange) -> Self {
        Self {
            start: block.start().value(),
            end: block.end().value(),
            count: block.len(),
        }
    }
}

impl ReserveCommand {
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let mut config = load_configuration(global, Config::default())?;
        apply_window_flags(self.start, self.end, &mut config);
        if self.skip_occupancy_check {
            config
                .occupancy_check
                .get_or_insert_with(Default::default)
                .skip = Some(true);
        }

        let count = self.count.unwrap_or_else(|| config.block_size());
        let allocator = allocator_from_config(&config, Arc::new(ReservationRegistry::new()))
            .map_err(|e| CliError::InvalidArguments(e.to_string()))?;

        let block = allocator.reserve(count, &deadline_token(self.timeout))?;
        log::info!("reserved {block} from window {}", allocator.window());

        println!("{}", render(block, self.format)?);
        Ok(())
    }
}

fn render(block: PortRange, format: ReserveOutputFormat) -> Result<String, CliError> {
    let reserved = ReservedBlock::from(block);
    match format {
        ReserveOutputFormat::Text => Ok(block.to_string()),
        ReserveOutputFormat::Json => serde_json::to_string_pretty(&reserved)
            .map_err(|e| CliError::Config(format!("JSON serialization failed: {e}"))),
        ReserveOutputFormat::Yaml => serde_yaml::to_string(&reserved)
            .map(|yaml| yaml.trim_end().to_string())
            .map_err(|e| CliError::Config(format!("YAML serialization failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasv::Port;

    fn block() -> PortRange {
        PortRange::from_start(Port::try_from(30010).unwrap(), 5).unwrap()
    }

    #[test]
    fn test_render_text() {
        assert_eq!(render(block(), ReserveOutputFormat::Text).unwrap(), "30010-30014");
    }

    #[test]
    fn test_render_json() {
        let json = render(block(), ReserveOutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["start"], 30010);
        assert_eq!(value["end"], 30014);
        assert_eq!(value["count"], 5);
    }

    #[test]
    fn test_render_yaml() {
        let yaml = render(block(), ReserveOutputFormat::Yaml).unwrap();
        assert!(yaml.contains("start: 30010"));
        assert!(yaml.contains("count: 5"));
    }
}
