//! Concrete readiness probes.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};

use super::{Endpoint, ProbeFailure, ProbeKind, ReadinessProbe};

/// Default connect and I/O timeout for a single probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Payload written by [`EchoProbe`] unless another is configured.
pub const DEFAULT_ECHO_PAYLOAD: &[u8] = b"pasv-readiness-probe\n";

/// Opens a connection with `timeout` applied to connect, read and write.
///
/// Every resolved address is tried in order and the last error kept.
fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream, ProbeFailure> {
    let addrs = endpoint.socket_addrs().map_err(ProbeFailure::Connect)?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|()| stream.set_write_timeout(Some(timeout)))
                    .map_err(ProbeFailure::Io)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(match last_err {
        Some(err) if err.kind() == io::ErrorKind::TimedOut => ProbeFailure::Timeout(timeout),
        Some(err) => ProbeFailure::Connect(err),
        None => ProbeFailure::Connect(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{endpoint} resolved to no addresses"),
        )),
    })
}

/// Writes a payload and requires the same bytes back.
///
/// This is the minimal exchange that proves the service's accept loop and
/// request handling both run.
///
/// # Examples
///
/// ```no_run
/// use pasv::readiness::{EchoProbe, Endpoint, ReadinessProbe};
/// use pasv::Port;
///
/// let probe = EchoProbe::default();
/// probe.probe(&Endpoint::localhost(Port::try_from(30000).unwrap())).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct EchoProbe {
    payload: Vec<u8>,
    timeout: Duration,
}

impl Default for EchoProbe {
    fn default() -> Self {
        Self {
            payload: DEFAULT_ECHO_PAYLOAD.to_vec(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl EchoProbe {
    /// Creates a probe with the default payload and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the payload. An empty payload is replaced by the default.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        if !payload.is_empty() {
            self.payload = payload;
        }
        self
    }

    /// Sets the connect and I/O timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl ReadinessProbe for EchoProbe {
    fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeFailure> {
        let mut stream = connect(endpoint, self.timeout)?;

        stream
            .write_all(&self.payload)
            .and_then(|()| stream.flush())
            .map_err(|err| ProbeFailure::from_io(err, self.timeout))?;

        let mut received = vec![0u8; self.payload.len()];
        let mut filled = 0;
        while filled < received.len() {
            match stream.read(&mut received[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(ProbeFailure::from_io(err, self.timeout)),
            }
        }
        received.truncate(filled);
        let _ = stream.shutdown(Shutdown::Both);

        if received == self.payload {
            Ok(())
        } else {
            Err(ProbeFailure::Mismatch {
                expected: self.payload.clone(),
                received,
            })
        }
    }
}

/// Logs in to an FTP service and round-trips a small file over a passive
/// data connection.
///
/// Each attempt switches to binary passive mode, stores the payload under
/// [`remote_name`](Self::remote_name), retrieves it and requires the same
/// bytes back. The file is then deleted and the session closed. A service
/// whose passive port range is unusable fails here even while its control
/// channel answers.
///
/// # Examples
///
/// ```no_run
/// use pasv::readiness::{Endpoint, FtpTransferProbe, ReadinessProbe};
/// use pasv::Port;
///
/// let probe = FtpTransferProbe::new("ci", "secret");
/// probe.probe(&Endpoint::localhost(Port::try_from(2121).unwrap())).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FtpTransferProbe {
    username: String,
    password: String,
    payload: Vec<u8>,
    remote_name: String,
    timeout: Duration,
}

/// File name used for the round-trip unless another is configured.
pub const DEFAULT_FTP_REMOTE_NAME: &str = ".pasv-ready";

impl Default for FtpTransferProbe {
    fn default() -> Self {
        Self {
            username: "anonymous".into(),
            password: "pasv@localhost".into(),
            payload: DEFAULT_ECHO_PAYLOAD.to_vec(),
            remote_name: DEFAULT_FTP_REMOTE_NAME.into(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl FtpTransferProbe {
    /// Creates a probe that logs in with the given credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Sets the connect and I/O timeout, applied to both channels.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the payload. An empty payload is replaced by the default.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        if !payload.is_empty() {
            self.payload = payload;
        }
        self
    }

    /// Sets the remote file name used for the round-trip.
    #[must_use]
    pub fn with_remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = name.into();
        self
    }

    /// The login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The remote file name.
    #[must_use]
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    fn round_trip(&self, ftp: &mut FtpStream) -> Result<Vec<u8>, ProbeFailure> {
        let timeout = self.timeout;

        ftp.login(&self.username, &self.password)
            .map_err(|err| ftp_failure("login", err, timeout))?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|err| ftp_failure("TYPE", err, timeout))?;
        ftp.set_mode(Mode::Passive);

        let mut upload = ftp
            .put_with_stream(&self.remote_name)
            .map_err(|err| ftp_failure("STOR", err, timeout))?;
        upload
            .get_ref()
            .set_write_timeout(Some(timeout))
            .map_err(ProbeFailure::Io)?;
        upload
            .write_all(&self.payload)
            .and_then(|()| upload.flush())
            .map_err(|err| ProbeFailure::from_io(err, timeout))?;
        ftp.finalize_put_stream(upload)
            .map_err(|err| ftp_failure("STOR", err, timeout))?;

        let mut download = ftp
            .retr_as_stream(&self.remote_name)
            .map_err(|err| ftp_failure("RETR", err, timeout))?;
        download
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(ProbeFailure::Io)?;
        // One byte past the payload is enough to detect a longer reply.
        let limit = self.payload.len() as u64 + 1;
        let mut received = Vec::with_capacity(self.payload.len());
        std::io::Read::by_ref(&mut download)
            .take(limit)
            .read_to_end(&mut received)
            .map_err(|err| ProbeFailure::from_io(err, timeout))?;
        ftp.finalize_retr_stream(download)
            .map_err(|err| ftp_failure("RETR", err, timeout))?;

        Ok(received)
    }
}

impl ReadinessProbe for FtpTransferProbe {
    fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeFailure> {
        let stream = connect(endpoint, self.timeout)?;
        let mut ftp = FtpStream::connect_with_stream(stream)
            .map_err(|err| ftp_failure("greeting", err, self.timeout))?;

        let outcome = self.round_trip(&mut ftp);
        if outcome.is_ok() {
            if let Err(err) = ftp.rm(&self.remote_name) {
                log::debug!("Could not delete {} on {endpoint}: {err}", self.remote_name);
            }
        }
        let _ = ftp.quit();

        let received = outcome?;
        if received == self.payload {
            Ok(())
        } else {
            Err(ProbeFailure::Mismatch {
                expected: self.payload.clone(),
                received,
            })
        }
    }
}

fn ftp_failure(step: &str, err: FtpError, timeout: Duration) -> ProbeFailure {
    match err {
        FtpError::ConnectionError(err) => ProbeFailure::from_io(err, timeout),
        other => ProbeFailure::Protocol(format!("{step} failed: {other}")),
    }
}

/// A probe chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredProbe {
    /// See [`EchoProbe`].
    Echo(EchoProbe),
    /// See [`FtpTransferProbe`].
    Ftp(FtpTransferProbe),
}

impl ConfiguredProbe {
    /// Which kind of probe this is.
    #[must_use]
    pub fn kind(&self) -> ProbeKind {
        match self {
            Self::Echo(_) => ProbeKind::Echo,
            Self::Ftp(_) => ProbeKind::Ftp,
        }
    }
}

impl ReadinessProbe for ConfiguredProbe {
    fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeFailure> {
        match self {
            Self::Echo(probe) => probe.probe(endpoint),
            Self::Ftp(probe) => probe.probe(endpoint),
        }
    }
}
