//! Command to print the effective merged configuration.

use clap::{Args, ValueEnum};

use pasv::Config;

use crate::error::CliError;
use crate::utils::{effective_configuration, load_configuration, GlobalOptions};

const REDACTED: &str = "********";

/// Print the effective configuration.
#[derive(Args)]
pub struct ShowConfigCommand {
    /// Output format
    #[arg(long, value_enum, default_value = "yaml")]
    pub format: ShowConfigFormat,

    /// Print the FTP password instead of masking it
    #[arg(long)]
    pub show_secrets: bool,
}

/// How the configuration is printed.
#[derive(Clone, Copy, ValueEnum)]
pub enum ShowConfigFormat {
    /// YAML, loadable as a config file
    Yaml,
    /// JSON
    Json,
}

impl ShowConfigCommand {
    pub fn execute(self, global: &GlobalOptions) -> Result<(), CliError> {
        let config = load_configuration(global, Config::default())?;
        let mut effective = effective_configuration(&config);
        if !self.show_secrets {
            redact(&mut effective);
        }

        let rendered = match self.format {
            ShowConfigFormat::Yaml => serde_yaml::to_string(&effective)
                .map_err(|e| CliError::Config(format!("Failed to serialize config: {e}")))?,
            ShowConfigFormat::Json => serde_json::to_string_pretty(&effective)
                .map_err(|e| CliError::Config(format!("Failed to serialize config: {e}")))?,
        };
        println!("{}", rendered.trim_end());
        Ok(())
    }
}

fn redact(config: &mut Config) {
    if let Some(password) = config
        .readiness
        .as_mut()
        .and_then(|readiness| readiness.password.as_mut())
    {
        *password = REDACTED.to_string();
    }
}
