//! Configuration schema definitions.
//!
//! Every field is optional so that partial files can be layered. The
//! accessor methods on [`Config`] apply the built-in defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::port::listeners::ListenerQueryConfig;
use crate::readiness::{ProbeKind, RetryPolicy};
use crate::{Port, PortRange};

/// First port of the default window.
pub const DEFAULT_WINDOW_START: u16 = 30000;
/// Last port of the default window.
pub const DEFAULT_WINDOW_END: u16 = 30999;
/// Default number of ports per block.
pub const DEFAULT_BLOCK_SIZE: u16 = 10;
/// Default settle pause before rescanning a window, in milliseconds.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 250;
/// Default number of readiness attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Default pause between readiness attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
/// Default connect and I/O timeout for one probe, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
/// Default FTP login name.
pub const DEFAULT_FTP_USERNAME: &str = "anonymous";
/// Default FTP password.
pub const DEFAULT_FTP_PASSWORD: &str = "pasv@localhost";

/// Complete configuration structure.
///
/// # Examples
///
/// ```
/// use pasv::config::{Config, WindowConfig};
///
/// let config = Config {
///     window: Some(WindowConfig {
///         start: 40000,
///         end: Some(40099),
///         span: None,
///     }),
///     block_size: Some(4),
///     ..Default::default()
/// };
/// assert_eq!(config.window_range().unwrap().len(), 100);
/// assert_eq!(config.block_size(), 4);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The port window blocks are allocated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowConfig>,

    /// Ports per block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u16>,

    /// Pause before rescanning a window that yielded nothing, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,

    /// Listener query settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy_check: Option<OccupancyConfig>,

    /// Readiness polling settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessConfig>,
}

/// Port window configuration.
///
/// Either `end` or `span` can be given, not both. With neither, the default
/// window end is used.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    /// First port of the window.
    pub start: u16,

    /// Last port of the window, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u16>,

    /// Number of ports in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<u16>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_WINDOW_START,
            end: Some(DEFAULT_WINDOW_END),
            span: None,
        }
    }
}

impl WindowConfig {
    /// Resolves the configured bounds to a range.
    ///
    /// # Errors
    ///
    /// Returns an error if either bound is not a valid port, the end lies
    /// before the start, or `span` is zero or runs past the last port.
    pub fn to_range(&self) -> Result<PortRange> {
        let start = Port::try_from(self.start)?;
        let end = match (self.end, self.span) {
            (Some(end), _) => Port::try_from(end)?,
            (None, Some(span)) => {
                return PortRange::from_start(start, span).ok_or_else(|| {
                    crate::Error::Validation {
                        field: "window.span".into(),
                        message: format!("span {span} does not fit after port {start}"),
                    }
                });
            }
            (None, None) => Port::try_from(DEFAULT_WINDOW_END.max(self.start))?,
        };
        Ok(PortRange::new(start, end)?)
    }
}

/// Listener query configuration.
///
/// # Examples
///
/// ```
/// use pasv::config::OccupancyConfig;
///
/// let config = OccupancyConfig {
///     skip: Some(false),
///     include_udp: Some(true),
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OccupancyConfig {
    /// Treat every port as unbound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,

    /// Also count UDP sockets as listeners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_udp: Option<bool>,
}

/// Readiness polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Attempts before giving up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Pause between attempts, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Connect and I/O timeout for a single attempt, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Which probe to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeKind>,

    /// FTP login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// FTP password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Config {
    /// A config with every field set to its default.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            window: Some(WindowConfig::default()),
            block_size: Some(DEFAULT_BLOCK_SIZE),
            settle_delay_ms: Some(DEFAULT_SETTLE_DELAY_MS),
            occupancy_check: Some(OccupancyConfig {
                skip: Some(false),
                include_udp: Some(false),
            }),
            readiness: Some(ReadinessConfig {
                max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
                delay_ms: Some(DEFAULT_RETRY_DELAY_MS),
                connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
                probe: Some(ProbeKind::default()),
                username: Some(DEFAULT_FTP_USERNAME.into()),
                password: Some(DEFAULT_FTP_PASSWORD.into()),
            }),
        }
    }

    /// The window to allocate from.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured window is invalid.
    pub fn window_range(&self) -> Result<PortRange> {
        self.window.clone().unwrap_or_default().to_range()
    }

    /// Ports per block.
    #[must_use]
    pub fn block_size(&self) -> u16 {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// The settle pause.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS))
    }

    /// Options for listener queries.
    #[must_use]
    pub fn listener_query(&self) -> ListenerQueryConfig {
        self.occupancy_check
            .as_ref()
            .map(ListenerQueryConfig::from)
            .unwrap_or_default()
    }

    /// The readiness retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let readiness = self.readiness.as_ref();
        RetryPolicy::new(
            readiness
                .and_then(|r| r.max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            Duration::from_millis(
                readiness
                    .and_then(|r| r.delay_ms)
                    .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
        )
    }

    /// Timeout for a single probe.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(
            self.readiness
                .as_ref()
                .and_then(|r| r.connect_timeout_ms)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        )
    }

    /// Which probe to run.
    #[must_use]
    pub fn probe_kind(&self) -> ProbeKind {
        self.readiness
            .as_ref()
            .and_then(|r| r.probe)
            .unwrap_or_default()
    }

    /// FTP login name and password.
    #[must_use]
    pub fn ftp_credentials(&self) -> (String, String) {
        let readiness = self.readiness.as_ref();
        (
            readiness
                .and_then(|r| r.username.clone())
                .unwrap_or_else(|| DEFAULT_FTP_USERNAME.into()),
            readiness
                .and_then(|r| r.password.clone())
                .unwrap_or_else(|| DEFAULT_FTP_PASSWORD.into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_config_default_accessors() {
        let config = Config::default();
        assert_eq!(config.window_range().unwrap().to_string(), "30000-30999");
        assert_eq!(config.block_size(), 10);
        assert_eq!(config.settle_delay(), Duration::from_millis(250));
        assert_eq!(config.listener_query(), ListenerQueryConfig::default());
        assert_eq!(config.retry_policy().unwrap(), RetryPolicy::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.probe_kind(), ProbeKind::Echo);
        assert_eq!(config.ftp_credentials().0, "anonymous");
    }

    #[test]
    fn test_with_defaults_matches_accessor_defaults() {
        let explicit = Config::with_defaults();
        let implicit = Config::default();
        assert_eq!(explicit.window_range().unwrap(), implicit.window_range().unwrap());
        assert_eq!(explicit.block_size(), implicit.block_size());
        assert_eq!(explicit.settle_delay(), implicit.settle_delay());
        assert_eq!(explicit.retry_policy().unwrap(), implicit.retry_policy().unwrap());
        assert_eq!(explicit.ftp_credentials(), implicit.ftp_credentials());
    }

    #[test]
    fn test_window_span() {
        let window = WindowConfig {
            start: 40000,
            end: None,
            span: Some(5),
        };
        assert_eq!(window.to_range().unwrap().to_string(), "40000-40004");
    }

    #[test]
    fn test_window_span_past_max_port() {
        let window = WindowConfig {
            start: 65530,
            end: None,
            span: Some(10),
        };
        assert!(matches!(window.to_range(), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_window_start_only_above_default_end() {
        let window = WindowConfig {
            start: 40000,
            end: None,
            span: None,
        };
        assert_eq!(window.to_range().unwrap().to_string(), "40000-40000");
    }

    #[test]
    fn test_window_invalid() {
        let zero = WindowConfig {
            start: 0,
            end: Some(10),
            span: None,
        };
        assert!(matches!(zero.to_range(), Err(Error::InvalidPort { .. })));

        let backwards = WindowConfig {
            start: 5000,
            end: Some(4000),
            span: None,
        };
        assert!(matches!(
            backwards.to_range(),
            Err(Error::InvalidPortRange { .. })
        ));
    }

    #[test]
    fn test_config_deny_unknown_fields() {
        let yaml = "block_size: 4\nunknown_field: value\n";
        let result: std::result::Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_complete_config() {
        let yaml = r"
window:
  start: 40000
  end: 40099
block_size: 4
settle_delay_ms: 100
occupancy_check:
  skip: false
  include_udp: true
readiness:
  max_attempts: 5
  delay_ms: 200
  connect_timeout_ms: 500
  probe: ftp
  username: tester
  password: hunter2
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window_range().unwrap().len(), 100);
        assert_eq!(config.block_size(), 4);
        assert!(config.listener_query().include_udp);
        assert_eq!(config.probe_kind(), ProbeKind::Ftp);
        assert_eq!(
            config.ftp_credentials(),
            ("tester".to_string(), "hunter2".to_string())
        );
        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let config = Config {
            block_size: Some(3),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(yaml.trim(), "block_size: 3");
    }
}
