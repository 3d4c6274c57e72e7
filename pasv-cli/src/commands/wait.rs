//! Command to wait until a service completes a readiness probe.

use clap::Args;

use pasv::config::ReadinessConfig;
use pasv::{poller_from_config, Config, Endpoint, Port, ProbeKind};

use crate::commands::deadline_token;
use crate::error::CliError;
use crate::utils::{load_configuration, GlobalOptions};

/// Wait until a service answers a readiness probe.
#[derive(Args)]
pub struct WaitCommand {
    /// Port the service listens on
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Host the service listens on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Probe to run
    #[arg(long, value_enum)]
    pub probe: Option<ProbeKind>,

    /// Maximum number of probe attempts
    #[arg(long, value_name = "N")]
    pub attempts: Option<u32>,

    /// Pause between attempts, in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Connect and I/O timeout for one attempt, in milliseconds
    #[arg(long, value_name = "MS")]
    pub connect_timeout_ms: Option<u64>,

    /// FTP login name
    #[arg(long, value_name = "NAME")]
    pub user: Option<String>,

    /// FTP password
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Give up after this many seconds regardless of attempts left
    #[arg(long, value_name = "SECONDS")]
    pub deadline: Option<u64>,
}

impl WaitCommand {
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let port = Port::try_from(self.port)
            .map_err(|e| CliError::InvalidArguments(e.to_string()))?;
        if self.attempts == Some(0) {
            return Err(CliError::InvalidArguments(
                "--attempts must be at least 1".into(),
            ));
        }

        let config = load_configuration(global, self.overrides())?;
        let poller = poller_from_config(&config)?;
        let endpoint = Endpoint::new(self.host, port);

        let report = poller.wait_until_ready(&endpoint, &deadline_token(self.deadline))?;

        if !global.quiet {
            println!(
                "{endpoint} ready after {} attempt(s) ({} ms)",
                report.attempts,
                report.elapsed.as_millis()
            );
        }
        Ok(())
    }

    fn overrides(&self) -> Config {
        let readiness = ReadinessConfig {
            max_attempts: self.attempts,
            delay_ms: self.delay_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            probe: self.probe,
            username: self.user.clone(),
            password: self.password.clone(),
        };
        Config {
            readiness: (readiness != ReadinessConfig::default()).then_some(readiness),
            ..Default::default()
        }
    }
}
