//! Configuration validation.

use crate::config::schema::{Config, ReadinessConfig, WindowConfig};
use crate::error::{Error, Result};
use crate::port::Port;

/// Longest settle pause accepted, in milliseconds.
pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;

/// Validates configuration values and their consistency.
///
/// # Examples
///
/// ```
/// use pasv::config::{Config, ConfigValidator};
///
/// ConfigValidator::validate(&Config::default()).unwrap();
/// ConfigValidator::validate(&Config::with_defaults()).unwrap();
///
/// let bad = Config { block_size: Some(0), ..Default::default() };
/// assert!(ConfigValidator::validate(&bad).is_err());
/// ```
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(config: &Config) -> Result<()> {
        if let Some(ref window) = config.window {
            Self::validate_window(window)?;
        }

        if let Some(size) = config.block_size {
            Self::validate_block_size(size, config)?;
        }

        if let Some(delay) = config.settle_delay_ms {
            if delay > MAX_SETTLE_DELAY_MS {
                return Err(Error::Validation {
                    field: "settle_delay_ms".into(),
                    message: format!("Must not exceed {MAX_SETTLE_DELAY_MS}"),
                });
            }
        }

        if let Some(ref readiness) = config.readiness {
            Self::validate_readiness(readiness)?;
        }

        Ok(())
    }

    /// Validate window bounds.
    fn validate_window(window: &WindowConfig) -> Result<()> {
        Port::try_from(window.start).map_err(|_| Error::Validation {
            field: "window.start".into(),
            message: format!("Invalid port number: {}", window.start),
        })?;

        if window.end.is_some() && window.span.is_some() {
            return Err(Error::Validation {
                field: "window".into(),
                message: "Cannot specify both end and span".into(),
            });
        }

        if let Some(end) = window.end {
            Port::try_from(end).map_err(|_| Error::Validation {
                field: "window.end".into(),
                message: format!("Invalid port number: {end}"),
            })?;
            if end < window.start {
                return Err(Error::Validation {
                    field: "window".into(),
                    message: "end must be >= start".into(),
                });
            }
        }

        if window.span == Some(0) {
            return Err(Error::Validation {
                field: "window.span".into(),
                message: "Span must be greater than 0".into(),
            });
        }

        window.to_range().map(|_| ()).map_err(|err| match err {
            Error::Validation { .. } => err,
            other => Error::Validation {
                field: "window".into(),
                message: other.to_string(),
            },
        })
    }

    /// A block must be non-empty and fit in the effective window.
    fn validate_block_size(size: u16, config: &Config) -> Result<()> {
        if size == 0 {
            return Err(Error::Validation {
                field: "block_size".into(),
                message: "Must be at least 1".into(),
            });
        }

        let window = config.window_range()?;
        if u32::from(size) > window.len() {
            return Err(Error::Validation {
                field: "block_size".into(),
                message: format!("{size} ports do not fit in window {window}"),
            });
        }
        Ok(())
    }

    fn validate_readiness(readiness: &ReadinessConfig) -> Result<()> {
        if readiness.max_attempts == Some(0) {
            return Err(Error::Validation {
                field: "readiness.max_attempts".into(),
                message: "Must be at least 1".into(),
            });
        }

        if readiness.connect_timeout_ms == Some(0) {
            return Err(Error::Validation {
                field: "readiness.connect_timeout_ms".into(),
                message: "Timeout must be greater than 0".into(),
            });
        }

        if let Some(ref username) = readiness.username {
            if username.trim().is_empty() {
                return Err(Error::Validation {
                    field: "readiness.username".into(),
                    message: "Cannot be empty or only whitespace".into(),
                });
            }
            Self::validate_command_argument("readiness.username", username)?;
        }

        if let Some(ref password) = readiness.password {
            Self::validate_command_argument("readiness.password", password)?;
        }

        Ok(())
    }

    /// Credentials are sent as FTP command arguments and must stay on one line.
    fn validate_command_argument(field: &str, value: &str) -> Result<()> {
        if value.contains(['\r', '\n', '\0']) {
            return Err(Error::Validation {
                field: field.into(),
                message: "Cannot contain line breaks or null bytes".into(),
            });
        }
        Ok(())
    }
}
