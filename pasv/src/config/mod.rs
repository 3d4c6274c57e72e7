//! Layered configuration for the allocator and readiness poller.
//!
//! # Configuration Precedence
//!
//! Sources are merged in this order (highest wins):
//!
//! 1. Programmatic overrides (via `ConfigBuilder::with_config`)
//! 2. Environment variables (`PASV_*`)
//! 3. Private project config (`pasv.local.yaml`)
//! 4. Project config (`pasv.yaml`)
//! 5. User config (`~/.pasv/config.yaml`)
//! 6. Built-in defaults
//!
//! # Examples
//!
//! ```no_run
//! use pasv::config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new().build().unwrap();
//! println!("window {}", config.window_range().unwrap());
//! ```
//!
//! ```
//! use pasv::config::{Config, ConfigBuilder, WindowConfig};
//!
//! let custom = Config {
//!     window: Some(WindowConfig { start: 8000, end: Some(8099), span: None }),
//!     ..Default::default()
//! };
//!
//! let config = ConfigBuilder::new()
//!     .skip_files()
//!     .skip_env()
//!     .with_config(custom)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.window_range().unwrap().to_string(), "8000-8099");
//! ```

pub mod builder;
pub mod environment;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

pub use builder::ConfigBuilder;
pub use environment::EnvironmentConfig;
pub use loader::{default_data_dir, ConfigLoader, ConfigSource};
pub use merger::ConfigMerger;
pub use schema::{Config, OccupancyConfig, ReadinessConfig, WindowConfig};
pub use validator::ConfigValidator;
