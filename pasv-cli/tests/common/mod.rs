//! Common test utilities for CLI integration tests.
//!
//! Every command runs inside a temporary working directory with its own data
//! directory and with `PASV_*` variables cleared, so host configuration never
//! leaks into a test.

use assert_cmd::Command;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

const PASV_VARS: &[&str] = &[
    "PASV_DATA_DIR",
    "PASV_LOG_MODE",
    "PASV_WINDOW_START",
    "PASV_WINDOW_END",
    "PASV_BLOCK_SIZE",
    "PASV_SETTLE_DELAY_MS",
    "PASV_SKIP_OCCUPANCY_CHECK",
    "PASV_INCLUDE_UDP",
    "PASV_READY_ATTEMPTS",
    "PASV_READY_DELAY_MS",
    "PASV_CONNECT_TIMEOUT_MS",
    "PASV_PROBE",
    "PASV_FTP_USER",
    "PASV_FTP_PASSWORD",
];

/// Test environment with isolated working and data directories.
pub struct TestEnv {
    #[allow(dead_code)]
    temp_dir: TempDir,
    /// Working directory for commands.
    pub work_dir: PathBuf,
    /// Data directory passed via `--data-dir`.
    pub data_dir: PathBuf,
}

#[allow(dead_code)]
impl TestEnv {
    /// Create a new test environment.
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let work_dir = temp_dir.path().join("work");
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        Self {
            temp_dir,
            work_dir,
            data_dir,
        }
    }

    /// A command with a clean environment but no `--data-dir`.
    pub fn command_bare(&self) -> Command {
        let mut cmd = Command::cargo_bin("pasv").expect("Failed to find pasv binary");
        cmd.current_dir(&self.work_dir);
        for var in PASV_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// A command with `--data-dir` pointing at this environment.
    pub fn command(&self) -> Command {
        let mut cmd = self.command_bare();
        cmd.arg("--data-dir").arg(&self.data_dir);
        cmd
    }

    /// Writes a file into the working directory.
    pub fn write_project_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.work_dir.join(name);
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Writes the user config in the data directory.
    pub fn write_user_config(&self, contents: &str) -> PathBuf {
        let path = self.data_dir.join("config.yaml");
        std::fs::write(&path, contents).expect("Failed to write user config");
        path
    }

    /// The working directory.
    pub fn path(&self) -> &Path {
        &self.work_dir
    }
}

/// Parse a `start-end` line printed by `reserve`.
#[allow(dead_code)]
pub fn parse_block(output: &[u8]) -> (u16, u16) {
    let text = String::from_utf8_lossy(output);
    let (start, end) = text
        .trim()
        .split_once('-')
        .unwrap_or_else(|| panic!("not a block: {text}"));
    (start.parse().unwrap(), end.parse().unwrap())
}

/// Starts a loopback echo server and returns its port. The server thread
/// lives until the test process exits.
#[allow(dead_code)]
pub fn spawn_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo server");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let mut buf = [0u8; 64];
            if let Ok(n) = stream.read(&mut buf) {
                let _ = stream.write_all(&buf[..n]);
            }
        }
    });
    port
}

/// A loopback port with nothing listening on it.
#[allow(dead_code)]
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().unwrap().port()
}
