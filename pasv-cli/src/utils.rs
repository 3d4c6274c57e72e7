//! Utility functions for CLI operations.
//!
//! Shared configuration loading and window resolution for the commands.

use std::path::PathBuf;

use pasv::config::ConfigMerger;
use pasv::{Config, ConfigBuilder, PortRange};

use crate::error::CliError;

/// Global CLI options shared across all commands.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Enable verbose output.
    pub verbose: bool,

    /// Suppress non-essential output.
    pub quiet: bool,

    /// Override the data directory location.
    pub data_dir: Option<PathBuf>,
}

/// Load hierarchical configuration, layering `overrides` on top.
///
/// Configuration is merged from multiple sources with precedence:
/// 1. Command-line overrides (highest priority)
/// 2. Environment variables
/// 3. Configuration files
/// 4. Built-in defaults (lowest priority)
pub fn load_configuration(global: &GlobalOptions, overrides: Config) -> Result<Config, CliError> {
    let mut builder = ConfigBuilder::new().with_config(overrides);
    if let Some(ref data_dir) = global.data_dir {
        builder = builder.with_data_dir(data_dir);
    }
    builder.build().map_err(|e| CliError::Config(e.to_string()))
}

/// Applies `--start`/`--end` flags on top of the loaded window.
///
/// A lone `--start` keeps the configured end or span; a lone `--end` keeps
/// the configured start.
pub fn apply_window_flags(start: Option<u16>, end: Option<u16>, config: &mut Config) {
    if start.is_none() && end.is_none() {
        return;
    }
    let mut window = config.window.clone().unwrap_or_default();
    if let Some(start) = start {
        window.start = start;
    }
    if let Some(end) = end {
        window.end = Some(end);
        window.span = None;
    }
    config.window = Some(window);
}

/// The window to operate on.
pub fn resolve_window(config: &Config) -> Result<PortRange, CliError> {
    config
        .window_range()
        .map_err(|e| CliError::InvalidArguments(e.to_string()))
}

/// The effective configuration with every default filled in.
///
/// A configured window is shown as written, since its missing bound is
/// resolved against the start rather than the default end.
pub fn effective_configuration(config: &Config) -> Config {
    let mut effective = Config::with_defaults();
    ConfigMerger::merge_into(&mut effective, config);
    if config.window.is_some() {
        effective.window.clone_from(&config.window);
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_flags_start_and_end() {
        let mut config = Config::default();
        apply_window_flags(Some(40000), Some(40009), &mut config);
        assert_eq!(resolve_window(&config).unwrap().to_string(), "40000-40009");
    }

    #[test]
    fn test_window_flags_none_is_noop() {
        let mut config = Config::default();
        apply_window_flags(None, None, &mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_window_flags_end_before_start_rejected() {
        let mut config = Config::default();
        apply_window_flags(None, Some(20000), &mut config);
        assert!(matches!(
            resolve_window(&config),
            Err(CliError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_effective_configuration_fills_defaults() {
        let config = Config {
            block_size: Some(3),
            ..Default::default()
        };
        let effective = effective_configuration(&config);
        assert_eq!(effective.block_size, Some(3));
        assert!(effective.readiness.is_some());
        assert!(effective.window.is_some());
    }
}
