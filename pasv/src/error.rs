//! Error types for the pasv library.
//!
//! Only conditions a caller must act on live here. Claim collisions and single
//! failed probes are absorbed by their retry loops and never become an
//! [`Error`].

use std::path::PathBuf;

use thiserror::Error;

use crate::port::{Port, PortRange};
use crate::readiness::{Endpoint, ProbeFailure};

/// Result type alias for operations that may fail with a pasv error.
///
/// # Examples
///
/// ```
/// use pasv::{Error, Result};
///
/// fn block_size() -> Result<u16> {
///     Ok(10)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the pasv library.
#[derive(Debug, Error)]
pub enum Error {
    /// An invalid port number was provided.
    #[error("invalid port {value}: {reason}")]
    InvalidPort {
        /// The invalid port value.
        value: u16,
        /// The reason the port is invalid.
        reason: String,
    },

    /// An invalid port range was specified.
    #[error("invalid port range {start}-{end}: {reason}")]
    InvalidPortRange {
        /// The first port of the range.
        start: u16,
        /// The last port of the range.
        end: u16,
        /// The reason the range is invalid.
        reason: String,
    },

    /// An invalid filesystem path was provided.
    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
        /// The reason the path is invalid.
        reason: String,
    },

    /// A configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Configuration(#[from] serde_yaml::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A validation error occurred.
    #[error("validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// A description of the validation failure.
        message: String,
    },

    /// No contiguous block of the requested size could be claimed after a
    /// full wrapped pass over the window.
    ///
    /// This is a capacity problem. Retrying with the same parameters will not
    /// help.
    #[error("port window {window} exhausted: no free block of {count} consecutive port(s)")]
    WindowExhausted {
        /// The window that was scanned.
        window: PortRange,
        /// The requested block size.
        count: u16,
    },

    /// Querying the host's listener state failed.
    #[error("listener query failed for port {port}: {source}")]
    ListenerQueryFailed {
        /// The port being inspected.
        port: Port,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service never completed a protocol round-trip within the retry
    /// budget.
    #[error("{endpoint} not ready after {attempts} attempt(s): {last_failure}")]
    ReadinessTimeout {
        /// The endpoint that was polled.
        endpoint: Endpoint,
        /// How many probes were made.
        attempts: u32,
        /// The failure reported by the final probe.
        #[source]
        last_failure: ProbeFailure,
    },

    /// A service could not be launched for a fixture.
    #[error("failed to launch service on block {block}: {source}")]
    ServiceLaunch {
        /// The block handed to the launcher.
        block: PortRange,
        /// The launcher's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A fixture's service failed to shut down cleanly. Its ports were still
    /// released.
    #[error("failed to shut down service at {endpoint}: {source}")]
    ServiceShutdown {
        /// The service's primary endpoint.
        endpoint: Endpoint,
        /// The service's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation was cancelled by its caller or hit its deadline.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<crate::port::InvalidPortError> for Error {
    fn from(err: crate::port::InvalidPortError) -> Self {
        Self::InvalidPort {
            value: err.value,
            reason: err.reason,
        }
    }
}

impl From<crate::port::InvalidPortRangeError> for Error {
    fn from(err: crate::port::InvalidPortRangeError) -> Self {
        Self::InvalidPortRange {
            start: err.start.value(),
            end: err.end.value(),
            reason: err.reason,
        }
    }
}

impl Error {
    /// Returns `true` if the error means the window cannot fit the request.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::WindowExhausted { .. })
    }

    /// Returns `true` if the error came from a fired [`CancelToken`](crate::CancelToken).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
