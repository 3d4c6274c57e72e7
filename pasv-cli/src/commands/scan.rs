//! Command to show which parts of a window are bound and which are free.
//!
//! Useful for diagnosing a `window exhausted` failure: the largest free run
//! is the largest block that could currently be reserved.

use std::io;

use clap::{Args, ValueEnum};
use serde::Serialize;

use pasv::{Config, ListenerSnapshot, ListenerSource, PortRange, SystemListenerSource};

use crate::error::CliError;
use crate::utils::{apply_window_flags, load_configuration, resolve_window, GlobalOptions};

/// Show bound ports and free runs in a window.
#[derive(Args)]
pub struct ScanCommand {
    /// First port of the window (uses config if not specified)
    #[arg(long, value_name = "PORT")]
    pub start: Option<u16>,

    /// Last port of the window (uses config if not specified)
    #[arg(long, value_name = "PORT")]
    pub end: Option<u16>,

    /// Fail unless a free run of at least this many ports exists
    #[arg(long, value_name = "COUNT")]
    pub count: Option<u16>,

    /// Also treat UDP sockets as bound
    #[arg(long)]
    pub include_udp: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: ScanOutputFormat,
}

/// How scan results are printed.
#[derive(Clone, Copy, ValueEnum)]
pub enum ScanOutputFormat {
    /// Aligned columns with a summary line
    Table,
    /// JSON array of runs
    Json,
    /// CSV with a header row
    Csv,
}

/// Whether a run of ports is available.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Nothing listens on these ports.
    Free,
    /// Every port in the run is bound.
    Bound,
}

/// A maximal run of ports sharing one state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunRow {
    /// First port of the run.
    pub start: u32,
    /// Last port of the run.
    pub end: u32,
    /// Number of ports.
    pub length: u32,
    /// Free or bound.
    pub state: RunState,
}

impl RunRow {
    fn new(start: u32, end: u32, state: RunState) -> Self {
        Self {
            start,
            end,
            length: end - start + 1,
            state,
        }
    }
}

impl ScanCommand {
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let mut config = load_configuration(global, Config::default())?;
        apply_window_flags(self.start, self.end, &mut config);
        let window = resolve_window(&config)?;

        let mut query = config.listener_query();
        query.include_udp |= self.include_udp;
        // A scan that skips the check would report everything free.
        query.skip = false;

        let snapshot = SystemListenerSource.snapshot(&window, &query)?;
        let rows = classify(&window, &snapshot);
        self.output_results(&window, &rows)?;

        if let Some(count) = self.count {
            let largest = largest_free(&rows);
            if largest < u32::from(count) {
                return Err(CliError::SemanticFailure(format!(
                    "No free run of {count} ports in {window} (largest is {largest})"
                )));
            }
        }

        Ok(())
    }

    fn output_results(&self, window: &PortRange, rows: &[RunRow]) -> Result<(), CliError> {
        match self.format {
            ScanOutputFormat::Table => {
                println!("{:<8} {:<8} {:<8} State", "Start", "End", "Length");
                println!("{}", "-".repeat(36));
                for row in rows {
                    let state = match row.state {
                        RunState::Free => "free",
                        RunState::Bound => "bound",
                    };
                    println!(
                        "{:<8} {:<8} {:<8} {state}",
                        row.start, row.end, row.length
                    );
                }
                let bound: u32 = rows
                    .iter()
                    .filter(|row| row.state == RunState::Bound)
                    .map(|row| row.length)
                    .sum();
                println!();
                println!(
                    "{window}: {bound} bound, largest free run {}",
                    largest_free(rows)
                );
            }
            ScanOutputFormat::Json => {
                let json = serde_json::to_string_pretty(rows)
                    .map_err(|e| CliError::Config(format!("JSON serialization failed: {e}")))?;
                println!("{json}");
            }
            ScanOutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(io::stdout());
                for row in rows {
                    writer
                        .serialize(row)
                        .map_err(|e| CliError::Io(io::Error::other(e)))?;
                }
                writer.flush()?;
            }
        }
        Ok(())
    }
}

/// Splits `window` into alternating free and bound runs, in port order.
pub fn classify(window: &PortRange, snapshot: &ListenerSnapshot) -> Vec<RunRow> {
    let mut rows = Vec::new();
    let mut next = u32::from(window.start().value());

    for free in snapshot.free_runs(window) {
        let start = u32::from(free.start().value());
        let end = u32::from(free.end().value());
        if start > next {
            rows.push(RunRow::new(next, start - 1, RunState::Bound));
        }
        rows.push(RunRow::new(start, end, RunState::Free));
        next = end + 1;
    }

    let last = u32::from(window.end().value());
    if next <= last {
        rows.push(RunRow::new(next, last, RunState::Bound));
    }
    rows
}

fn largest_free(rows: &[RunRow]) -> u32 {
    rows.iter()
        .filter(|row| row.state == RunState::Free)
        .map(|row| row.length)
        .max()
        .unwrap_or(0)
}
