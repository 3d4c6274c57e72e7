//! Environment variable handling for configuration overrides.
//!
//! Recognized variables:
//!
//! | Variable                    | Field                           |
//! |-----------------------------|---------------------------------|
//! | `PASV_WINDOW_START`         | `window.start`                  |
//! | `PASV_WINDOW_END`           | `window.end`                    |
//! | `PASV_BLOCK_SIZE`           | `block_size`                    |
//! | `PASV_SETTLE_DELAY_MS`      | `settle_delay_ms`               |
//! | `PASV_SKIP_OCCUPANCY_CHECK` | `occupancy_check.skip`          |
//! | `PASV_INCLUDE_UDP`          | `occupancy_check.include_udp`   |
//! | `PASV_READY_ATTEMPTS`       | `readiness.max_attempts`        |
//! | `PASV_READY_DELAY_MS`       | `readiness.delay_ms`            |
//! | `PASV_CONNECT_TIMEOUT_MS`   | `readiness.connect_timeout_ms`  |
//! | `PASV_PROBE`                | `readiness.probe`               |
//! | `PASV_FTP_USER`             | `readiness.username`            |
//! | `PASV_FTP_PASSWORD`         | `readiness.password`            |

use std::env;
use std::str::FromStr;

use crate::config::schema::{Config, ReadinessConfig};
use crate::error::{Error, Result};
use crate::readiness::ProbeKind;

/// Handles environment variable overrides for configuration.
///
/// # Examples
///
/// ```no_run
/// use pasv::config::{Config, EnvironmentConfig};
///
/// let mut config = Config::default();
/// EnvironmentConfig::apply_overrides(&mut config).unwrap();
/// ```
pub struct EnvironmentConfig;

impl EnvironmentConfig {
    /// Apply `PASV_*` overrides to `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable holds a value of the wrong type.
    pub fn apply_overrides(config: &mut Config) -> Result<()> {
        Self::apply_window_overrides(config)?;

        if let Some(size) = Self::number("PASV_BLOCK_SIZE")? {
            config.block_size = Some(size);
        }

        if let Some(delay) = Self::number("PASV_SETTLE_DELAY_MS")? {
            config.settle_delay_ms = Some(delay);
        }

        Self::apply_occupancy_overrides(config)?;
        Self::apply_readiness_overrides(config)?;

        Ok(())
    }

    fn apply_window_overrides(config: &mut Config) -> Result<()> {
        let start = Self::number::<u16>("PASV_WINDOW_START")?;
        let end = Self::number::<u16>("PASV_WINDOW_END")?;
        if start.is_none() && end.is_none() {
            return Ok(());
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
        Ok(())
    }

    fn apply_occupancy_overrides(config: &mut Config) -> Result<()> {
        let skip = Self::flag("PASV_SKIP_OCCUPANCY_CHECK")?;
        let include_udp = Self::flag("PASV_INCLUDE_UDP")?;
        if skip.is_none() && include_udp.is_none() {
            return Ok(());
        }

        let occupancy = config.occupancy_check.get_or_insert_with(Default::default);
        if skip.is_some() {
            occupancy.skip = skip;
        }
        if include_udp.is_some() {
            occupancy.include_udp = include_udp;
        }
        Ok(())
    }

    fn apply_readiness_overrides(config: &mut Config) -> Result<()> {
        let overrides = ReadinessConfig {
            max_attempts: Self::number("PASV_READY_ATTEMPTS")?,
            delay_ms: Self::number("PASV_READY_DELAY_MS")?,
            connect_timeout_ms: Self::number("PASV_CONNECT_TIMEOUT_MS")?,
            probe: Self::probe("PASV_PROBE")?,
            username: env::var("PASV_FTP_USER").ok(),
            password: env::var("PASV_FTP_PASSWORD").ok(),
        };
        if overrides == ReadinessConfig::default() {
            return Ok(());
        }

        let readiness = config.readiness.get_or_insert_with(Default::default);
        super::merger::ConfigMerger::merge_readiness(readiness, &overrides);
        Ok(())
    }

    fn number<T: FromStr>(name: &str) -> Result<Option<T>> {
        match env::var(name) {
            Ok(value) => value.trim().parse().map(Some).map_err(|_| Error::Validation {
                field: name.into(),
                message: format!("Invalid number: '{value}'"),
            }),
            Err(_) => Ok(None),
        }
    }

    fn flag(name: &str) -> Result<Option<bool>> {
        match env::var(name) {
            Ok(value) => Self::parse_bool(name, &value).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn probe(name: &str) -> Result<Option<ProbeKind>> {
        match env::var(name) {
            Ok(value) => match value.trim().to_lowercase().as_str() {
                "echo" => Ok(Some(ProbeKind::Echo)),
                "ftp" => Ok(Some(ProbeKind::Ftp)),
                _ => Err(Error::Validation {
                    field: name.into(),
                    message: format!("Unknown probe '{value}' (expected echo or ftp)"),
                }),
            },
            Err(_) => Ok(None),
        }
    }

    /// Parse a boolean value from a string.
    ///
    /// Accepts: true/1/yes/on for true, false/0/no/off for false (case-insensitive).
    fn parse_bool(field: &str, s: &str) -> Result<bool> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::Validation {
                field: field.into(),
                message: format!(
                    "Invalid boolean value: '{s}' (expected true/false/1/0/yes/no/on/off)"
                ),
            }),
        }
    }
}
