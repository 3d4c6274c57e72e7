//! Readiness polling for freshly started services.
//!
//! A service that has bound its port is not necessarily able to serve. The
//! poller in this module repeatedly performs a real application-level
//! exchange against the service, through a [`ReadinessProbe`], until one
//! succeeds or the retry budget runs out.
//!
//! A bare TCP connect is never used as the readiness signal.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Port;

pub mod poller;
pub mod probe;

pub use poller::{poller_from_config, ProbeOutcome, ReadinessPoller, ReadyReport, RetryPolicy};
pub use probe::{ConfiguredProbe, EchoProbe, FtpTransferProbe};

/// A host and port to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: Port,
}

impl Endpoint {
    /// Creates an endpoint.
    ///
    /// ```
    /// use pasv::readiness::Endpoint;
    /// use pasv::Port;
    ///
    /// let endpoint = Endpoint::new("127.0.0.1", Port::try_from(2121).unwrap());
    /// assert_eq!(endpoint.to_string(), "127.0.0.1:2121");
    /// ```
    pub fn new(host: impl Into<String>, port: Port) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint on the IPv4 loopback address.
    #[must_use]
    pub fn localhost(port: Port) -> Self {
        Self::new("127.0.0.1", port)
    }

    /// The host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    #[must_use]
    pub fn port(&self) -> Port {
        self.port
    }

    /// Resolves the endpoint to socket addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution fails or yields nothing.
    pub fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port.value())
            .to_socket_addrs()?
            .collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{self} resolved to no addresses"),
            ));
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Why a single probe attempt did not prove the service ready.
///
/// Every variant means "not ready yet". The poller absorbs these until its
/// budget runs out, then reports the last one.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// No connection could be established.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The connection was established but reading or writing failed.
    #[error("I/O failed: {0}")]
    Io(#[source] io::Error),

    /// The echoed payload did not match what was sent.
    #[error("echo mismatch: sent {} byte(s), read back {:?}", expected.len(), String::from_utf8_lossy(received))]
    Mismatch {
        /// The payload that was written.
        expected: Vec<u8>,
        /// The bytes that came back.
        received: Vec<u8>,
    },

    /// The service answered, but not with what the protocol requires.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The exchange did not complete within the probe's timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ProbeFailure {
    /// Maps an I/O error from an established connection, turning socket
    /// timeouts into [`ProbeFailure::Timeout`].
    pub(crate) fn from_io(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout(timeout),
            _ => Self::Io(err),
        }
    }
}

/// One protocol round-trip against an endpoint.
///
/// Implementations connect, perform a minimal exchange that only a working
/// service can complete, and disconnect. Returning `Ok(())` means the
/// service is ready.
#[cfg_attr(test, mockall::automock)]
pub trait ReadinessProbe: Send + Sync {
    /// Performs one attempt.
    ///
    /// # Errors
    ///
    /// Returns the reason the service is not ready yet.
    fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeFailure>;
}

/// Which probe to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Write a payload and read the same bytes back.
    #[default]
    Echo,
    /// Log in to an FTP service and round-trip a file in passive mode.
    Ftp,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => write!(f, "echo"),
            Self::Ftp => write!(f, "ftp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        let port = Port::try_from(30000).unwrap();
        assert_eq!(Endpoint::localhost(port).to_string(), "127.0.0.1:30000");
        assert_eq!(Endpoint::new("::1", port).to_string(), "[::1]:30000");
    }

    #[test]
    fn test_endpoint_resolves_loopback() {
        let endpoint = Endpoint::localhost(Port::try_from(30000).unwrap());
        let addrs = endpoint.socket_addrs().unwrap();
        assert_eq!(addrs[0].port(), 30000);
        assert!(addrs[0].ip().is_loopback());
    }

    #[test]
    fn test_from_io_maps_timeouts() {
        let timeout = Duration::from_millis(50);
        let err = io::Error::new(io::ErrorKind::WouldBlock, "would block");
        assert!(matches!(
            ProbeFailure::from_io(err, timeout),
            ProbeFailure::Timeout(t) if t == timeout
        ));

        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(ProbeFailure::from_io(err, timeout), ProbeFailure::Io(_)));
    }

    #[test]
    fn test_mismatch_message() {
        let failure = ProbeFailure::Mismatch {
            expected: b"ping".to_vec(),
            received: b"pong".to_vec(),
        };
        let message = failure.to_string();
        assert!(message.contains("4 byte"));
        assert!(message.contains("pong"));
    }

    #[test]
    fn test_probe_kind_serde() {
        let kind: ProbeKind = serde_yaml::from_str("ftp").unwrap();
        assert_eq!(kind, ProbeKind::Ftp);
        assert_eq!(ProbeKind::default().to_string(), "echo");
    }
}
