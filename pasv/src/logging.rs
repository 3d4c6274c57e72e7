//! Stderr logging for pasv.
//!
//! Library code logs through the [`log`] facade. This module supplies the
//! backend: a [`Logger`] with three verbosity levels that writes to stderr,
//! and [`init_logger`], which picks the level and installs it.

use std::env;
use std::fmt;

use log::{LevelFilter, Log, Metadata, Record};

/// Environment variable consulted by [`init_logger`] when no flag is given.
pub const LOG_MODE_ENV: &str = "PASV_LOG_MODE";

/// Logging level for controlling output verbosity.
///
/// # Examples
///
/// ```
/// use pasv::LogLevel;
///
/// assert!(LogLevel::Quiet < LogLevel::Normal);
/// assert!(LogLevel::Normal < LogLevel::Verbose);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Suppress all non-essential output.
    Quiet,
    /// Errors and warnings.
    Normal,
    /// Everything, including scan and claim decisions.
    Verbose,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiet => write!(f, "quiet"),
            Self::Normal => write!(f, "normal"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

impl LogLevel {
    /// Parses a log level from a string, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `quiet`, `normal` or `verbose`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pasv::LogLevel;
    ///
    /// assert_eq!(LogLevel::parse("VERBOSE").unwrap(), LogLevel::Verbose);
    /// assert!(LogLevel::parse("loud").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "quiet" => Ok(Self::Quiet),
            "normal" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            _ => Err(format!("invalid log level: {s}")),
        }
    }

    /// The most detailed `log` level shown at this verbosity.
    #[must_use]
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Off,
            Self::Normal => LevelFilter::Warn,
            Self::Verbose => LevelFilter::Debug,
        }
    }
}

/// A stderr logger.
///
/// # Examples
///
/// ```
/// use pasv::{LogLevel, Logger};
///
/// let logger = Logger::new(LogLevel::Normal);
/// logger.warn("window nearly full");
/// logger.debug("not printed below Verbose");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Logger {
    level: LogLevel,
}

impl Logger {
    /// Creates a logger with the given level.
    #[must_use]
    pub const fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Returns the current log level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Installs this logger as the global `log` backend.
    ///
    /// Only the first installation in a process registers a backend. The
    /// installed backend filters on the global maximum level, which every
    /// call updates.
    pub fn install(self) {
        if log::set_boxed_logger(Box::new(self)).is_err() {
            log::debug!("logger already installed; keeping it");
        }
        log::set_max_level(self.level.level_filter());
    }

    /// Logs an error message. Shown unless quiet.
    pub fn error(&self, message: &str) {
        self.emit(log::Level::Error, &message);
    }

    /// Logs a warning message. Shown unless quiet.
    pub fn warn(&self, message: &str) {
        self.emit(log::Level::Warn, &message);
    }

    /// Logs an informational message. Verbose only.
    pub fn info(&self, message: &str) {
        self.emit(log::Level::Info, &message);
    }

    /// Logs a debug message. Verbose only.
    pub fn debug(&self, message: &str) {
        self.emit(log::Level::Debug, &message);
    }

    fn shows(&self, level: log::Level) -> bool {
        level <= self.level.level_filter()
    }

    fn emit(&self, level: log::Level, message: &dyn fmt::Display) {
        if self.shows(level) {
            eprintln!("{}: {message}", level.as_str().to_uppercase());
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Normal)
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level().as_str().to_uppercase(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Picks a log level and installs a [`Logger`] for it.
///
/// Precedence: `verbose`, then `quiet`, then `PASV_LOG_MODE`, then
/// [`LogLevel::Normal`]. An unparseable `PASV_LOG_MODE` is ignored.
///
/// # Examples
///
/// ```
/// use pasv::{init_logger, LogLevel};
///
/// let logger = init_logger(true, false);
/// assert_eq!(logger.level(), LogLevel::Verbose);
/// ```
pub fn init_logger(verbose: bool, quiet: bool) -> Logger {
    let logger = Logger::new(resolve_level(verbose, quiet));
    logger.install();
    logger
}

fn resolve_level(verbose: bool, quiet: bool) -> LogLevel {
    if verbose {
        return LogLevel::Verbose;
    }
    if quiet {
        return LogLevel::Quiet;
    }
    env::var(LOG_MODE_ENV)
        .ok()
        .and_then(|value| LogLevel::parse(&value).ok())
        .unwrap_or(LogLevel::Normal)
}
