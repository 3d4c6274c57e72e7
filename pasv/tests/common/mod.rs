//! Common test utilities for integration tests.
//!
//! Provides port helpers and small loopback servers that the readiness probes
//! can talk to.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use pasv::{Port, PortRange};

/// Builds a port, panicking on invalid input.
#[allow(dead_code)]
pub fn port(value: u16) -> Port {
    Port::try_from(value).unwrap()
}

/// Builds an inclusive range, panicking on invalid input.
#[allow(dead_code)]
pub fn range(start: u16, end: u16) -> PortRange {
    PortRange::new(port(start), port(end)).unwrap()
}

/// How a [`LoopbackServer`] treats each accepted connection.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reads up to 64 bytes and writes them back.
    Echo,
    /// Answers the echo probe with different bytes.
    Garbage,
    /// Accepts and closes immediately.
    Hangup,
    /// Speaks enough FTP for a passive-mode store and retrieve.
    Ftp {
        /// Whether USER needs a PASS step.
        require_password: bool,
        /// How the data channel behaves.
        data: DataChannel,
    },
}

/// Data-channel behavior of the loopback FTP server.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannel {
    /// Stores and returns files faithfully.
    Working,
    /// Answers `PASV` with 425.
    Refused,
    /// Returns stored files with every byte flipped.
    Corrupting,
}

/// A loopback server running on its own thread until dropped.
#[derive(Debug)]
pub struct LoopbackServer {
    port: Port,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl LoopbackServer {
    /// Binds an ephemeral loopback port and serves `behavior`.
    pub fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        Self::serve(listener, behavior)
    }

    /// Serves `behavior` on an already bound listener.
    pub fn serve(listener: TcpListener, behavior: Behavior) -> Self {
        let port = port(listener.local_addr().unwrap().port());
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            for stream in listener.incoming() {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if let Ok(stream) = stream {
                    handle_connection(stream, &behavior);
                }
            }
        });

        Self {
            port,
            stop,
            handle: Some(handle),
        }
    }

    /// The port the server listens on.
    pub fn port(&self) -> Port {
        self.port
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so it sees the flag.
        let _ = TcpStream::connect(("127.0.0.1", self.port.value()));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(mut stream: TcpStream, behavior: &Behavior) {
    match behavior {
        Behavior::Echo => {
            let mut buf = [0u8; 64];
            if let Ok(n) = stream.read(&mut buf) {
                let _ = stream.write_all(&buf[..n]);
            }
        }
        Behavior::Garbage => {
            let mut buf = [0u8; 64];
            if let Ok(n) = stream.read(&mut buf) {
                let _ = stream.write_all(&vec![b'x'; n]);
            }
        }
        Behavior::Hangup => {}
        Behavior::Ftp {
            require_password,
            data,
        } => {
            let _ = ftp_dialogue(&mut stream, *require_password, *data);
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}

fn ftp_dialogue(stream: &mut TcpStream, require_password: bool, data: DataChannel) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    stream.write_all(b"220-test server\r\n220 ready\r\n")?;

    let mut files: HashMap<String, Vec<u8>> = HashMap::new();
    let mut passive: Option<TcpListener> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end();
        let (command, argument) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let reply = match command.to_uppercase().as_str() {
            "USER" if require_password => "331 password required\r\n".to_string(),
            "USER" | "PASS" => "230 logged in\r\n".to_string(),
            "TYPE" | "NOOP" => "200 ok\r\n".to_string(),
            "PASV" if data == DataChannel::Refused => "425 no data connection\r\n".to_string(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                format!("227 Entering Passive Mode (127,0,0,1,{},{})\r\n", port >> 8, port & 0xff)
            }
            "STOR" => match passive.take() {
                Some(listener) => {
                    stream.write_all(b"150 send it\r\n")?;
                    let (mut conn, _) = listener.accept()?;
                    let mut contents = Vec::new();
                    conn.read_to_end(&mut contents)?;
                    files.insert(argument.to_string(), contents);
                    "226 stored\r\n".to_string()
                }
                None => "425 use PASV first\r\n".to_string(),
            },
            "RETR" => match (passive.take(), files.get(argument)) {
                (Some(listener), Some(contents)) => {
                    stream.write_all(b"150 here it comes\r\n")?;
                    let (mut conn, _) = listener.accept()?;
                    let outgoing: Vec<u8> = match data {
                        DataChannel::Corrupting => contents.iter().map(|b| !b).collect(),
                        _ => contents.clone(),
                    };
                    conn.write_all(&outgoing)?;
                    drop(conn);
                    "226 sent\r\n".to_string()
                }
                (None, _) => "425 use PASV first\r\n".to_string(),
                (_, None) => "550 no such file\r\n".to_string(),
            },
            "DELE" if files.remove(argument).is_some() => "250 deleted\r\n".to_string(),
            "DELE" => "550 no such file\r\n".to_string(),
            "QUIT" => {
                stream.write_all(b"221 bye\r\n")?;
                return Ok(());
            }
            _ => "502 not implemented\r\n".to_string(),
        };
        stream.write_all(reply.as_bytes())?;
    }
}

/// Returns a loopback port with nothing listening on it.
#[allow(dead_code)]
pub fn closed_port() -> Port {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = port(listener.local_addr().unwrap().port());
    drop(listener);
    port
}
