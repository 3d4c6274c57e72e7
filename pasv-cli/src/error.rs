//! CLI-specific error types with exit codes.
//!
//! Library errors are wrapped and mapped to stable exit codes so scripts can
//! tell "not ready in time" apart from "no ports left".

use std::fmt;

use pasv::Error as LibError;

/// CLI-specific error type with exit code mapping.
#[derive(Debug)]
pub enum CliError {
    /// Library error (wrapped).
    Library(LibError),

    /// Invalid command-line arguments.
    InvalidArguments(String),

    /// I/O error.
    Io(std::io::Error),

    /// Configuration error.
    Config(String),

    /// Semantic failure (e.g., validation of a file failed) - exit code 1.
    SemanticFailure(String),

    /// A child process exited unsuccessfully; its code is passed through.
    ChildExited(i32),
}

impl CliError {
    /// Get the appropriate exit code for this error.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: Semantic failure
    /// - 2: Service not ready before the retry budget ran out
    /// - 3: Port window exhausted
    /// - 4: Invalid arguments
    /// - 5: I/O error
    /// - 6: Other library error
    /// - 7: Configuration error
    /// - 8: Cancelled (deadline reached)
    /// - child's own code for `run`
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::SemanticFailure(_) => 1,
            CliError::Library(lib_err) => match lib_err {
                LibError::ReadinessTimeout { .. } => 2,
                LibError::WindowExhausted { .. } => 3,
                LibError::Validation { .. }
                | LibError::InvalidPort { .. }
                | LibError::InvalidPortRange { .. } => 4,
                LibError::Io(_) => 5,
                LibError::Configuration(_) => 7,
                LibError::Cancelled => 8,
                _ => 6,
            },
            CliError::InvalidArguments(_) => 4,
            CliError::Io(_) => 5,
            CliError::Config(_) => 7,
            CliError::ChildExited(code) => *code,
        }
    }

    /// Whether `main` should print this error. A failing child has already
    /// reported for itself.
    pub fn should_report(&self) -> bool {
        !matches!(self, CliError::ChildExited(_))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Library(e) => write!(f, "{e}"),
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
            CliError::Config(msg) => write!(f, "Configuration error: {msg}"),
            CliError::SemanticFailure(msg) => write!(f, "{msg}"),
            CliError::ChildExited(code) => write!(f, "Command exited with status {code}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Library(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LibError> for CliError {
    fn from(e: LibError) -> Self {
        CliError::Library(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
