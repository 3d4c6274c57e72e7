//! Layered configuration assembly.

use std::path::{Path, PathBuf};

use crate::config::environment::EnvironmentConfig;
use crate::config::loader::ConfigLoader;
use crate::config::merger::ConfigMerger;
use crate::config::schema::Config;
use crate::config::validator::ConfigValidator;
use crate::error::Result;

/// Builds a [`Config`] from files, environment, and programmatic overrides.
///
/// # Examples
///
/// ```
/// use pasv::config::{Config, ConfigBuilder};
///
/// let config = ConfigBuilder::new()
///     .skip_files()
///     .skip_env()
///     .with_config(Config { block_size: Some(3), ..Default::default() })
///     .build()
///     .unwrap();
/// assert_eq!(config.block_size(), 3);
/// ```
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    working_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    skip_files: bool,
    skip_env: bool,
    overrides: Vec<Config>,
}

impl ConfigBuilder {
    /// Create a builder that reads files and the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory from which project configs are discovered.
    ///
    /// Defaults to the process working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Directory holding the user `config.yaml`.
    #[must_use]
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.data_dir = Some(dir.to_path_buf());
        self
    }

    /// Do not read any configuration file.
    #[must_use]
    pub fn skip_files(mut self) -> Self {
        self.skip_files = true;
        self
    }

    /// Ignore `PASV_*` environment variables.
    #[must_use]
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Layer `config` on top of everything else. Later calls win.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.overrides.push(config);
        self
    }

    /// Load, merge, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, an environment
    /// variable is malformed, or the merged result fails validation.
    pub fn build(self) -> Result<Config> {
        let mut config = if self.skip_files {
            Config::default()
        } else {
            let working_dir = match self.working_dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let sources = ConfigLoader::load_all(&working_dir, self.data_dir.as_deref())?;
            for source in &sources {
                log::debug!("Loaded configuration from {}", source.path.display());
            }
            ConfigMerger::merge(sources)
        };

        if !self.skip_env {
            EnvironmentConfig::apply_overrides(&mut config)?;
        }

        for overrides in &self.overrides {
            ConfigMerger::merge_into(&mut config, overrides);
        }

        ConfigValidator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE};
    use crate::config::WindowConfig;
    use crate::error::Error;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_defaults_only() {
        let config = ConfigBuilder::new()
            .skip_files()
            .skip_env()
            .build()
            .unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.block_size(), 10);
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let config = ConfigBuilder::new()
            .skip_files()
            .skip_env()
            .with_config(Config {
                block_size: Some(2),
                settle_delay_ms: Some(5),
                ..Default::default()
            })
            .with_config(Config {
                block_size: Some(4),
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_eq!(config.block_size, Some(4));
        assert_eq!(config.settle_delay_ms, Some(5));
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let result = ConfigBuilder::new()
            .skip_files()
            .skip_env()
            .with_config(Config {
                window: Some(WindowConfig {
                    start: 30000,
                    end: Some(30003),
                    span: None,
                }),
                block_size: Some(5),
                ..Default::default()
            })
            .build();

        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    #[serial]
    fn test_files_layer_by_precedence() {
        let data_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            data_dir.path().join("config.yaml"),
            "block_size: 2\nsettle_delay_ms: 7\n",
        )
        .unwrap();
        fs::write(project.path().join(PROJECT_CONFIG_FILE), "block_size: 3\n").unwrap();
        fs::write(
            project.path().join(LOCAL_CONFIG_FILE),
            "window:\n  start: 45000\n  span: 20\n",
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .with_working_dir(project.path())
            .with_data_dir(data_dir.path())
            .skip_env()
            .build()
            .unwrap();

        assert_eq!(config.block_size(), 3);
        assert_eq!(config.settle_delay_ms, Some(7));
        assert_eq!(config.window_range().unwrap().to_string(), "45000-45019");
    }

    #[test]
    #[serial]
    fn test_env_overrides_files() {
        let data_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(project.path().join(PROJECT_CONFIG_FILE), "block_size: 3\n").unwrap();

        let saved = std::env::var_os("PASV_BLOCK_SIZE");
        std::env::set_var("PASV_BLOCK_SIZE", "5");

        let result = ConfigBuilder::new()
            .with_working_dir(project.path())
            .with_data_dir(data_dir.path())
            .build();

        match saved {
            Some(value) => std::env::set_var("PASV_BLOCK_SIZE", value),
            None => std::env::remove_var("PASV_BLOCK_SIZE"),
        }

        assert_eq!(result.unwrap().block_size(), 5);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let data_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(project.path().join(PROJECT_CONFIG_FILE), "bogus_key: 1\n").unwrap();

        let result = ConfigBuilder::new()
            .with_working_dir(project.path())
            .with_data_dir(data_dir.path())
            .skip_env()
            .build();

        assert!(result.is_err());
    }
}
