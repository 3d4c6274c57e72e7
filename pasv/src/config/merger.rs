//! Configuration merging and precedence handling.

use crate::config::loader::ConfigSource;
use crate::config::schema::{Config, ReadinessConfig, WindowConfig};

/// Merges configuration sources according to precedence rules.
///
/// # Examples
///
/// ```
/// use pasv::config::{Config, ConfigMerger};
///
/// let low = Config { block_size: Some(4), ..Default::default() };
/// let high = Config { block_size: Some(8), ..Default::default() };
///
/// let mut result = low;
/// ConfigMerger::merge_into(&mut result, &high);
/// assert_eq!(result.block_size, Some(8));
/// ```
pub struct ConfigMerger;

impl ConfigMerger {
    /// Merge sources, given lowest precedence first, into one config.
    #[must_use]
    pub fn merge(sources: Vec<ConfigSource>) -> Config {
        let mut result = Config::default();
        for source in sources {
            Self::merge_into(&mut result, &source.config);
        }
        result
    }

    /// Merge `source` into `target`; set fields in `source` win.
    ///
    /// # Merging Rules
    ///
    /// - Scalar fields: source overwrites if set
    /// - Window: start always from source; an end or span in source replaces
    ///   both of target's, otherwise target's bound is kept
    /// - Readiness: field-by-field
    /// - Occupancy config: replaced as a whole
    pub fn merge_into(target: &mut Config, source: &Config) {
        if source.block_size.is_some() {
            target.block_size = source.block_size;
        }

        if source.settle_delay_ms.is_some() {
            target.settle_delay_ms = source.settle_delay_ms;
        }

        if let Some(ref source_window) = source.window {
            target.window = Some(match &target.window {
                Some(target_window) => Self::merge_window(target_window, source_window),
                None => source_window.clone(),
            });
        }

        if source.occupancy_check.is_some() {
            target.occupancy_check.clone_from(&source.occupancy_check);
        }

        if let Some(ref source_readiness) = source.readiness {
            let readiness = target.readiness.get_or_insert_with(Default::default);
            Self::merge_readiness(readiness, source_readiness);
        }
    }

    fn merge_window(target: &WindowConfig, source: &WindowConfig) -> WindowConfig {
        if source.end.is_some() || source.span.is_some() {
            source.clone()
        } else {
            WindowConfig {
                start: source.start,
                end: target.end,
                span: target.span,
            }
        }
    }

    /// Merge readiness settings field by field.
    pub fn merge_readiness(target: &mut ReadinessConfig, source: &ReadinessConfig) {
        if source.max_attempts.is_some() {
            target.max_attempts = source.max_attempts;
        }
        if source.delay_ms.is_some() {
            target.delay_ms = source.delay_ms;
        }
        if source.connect_timeout_ms.is_some() {
            target.connect_timeout_ms = source.connect_timeout_ms;
        }
        if source.probe.is_some() {
            target.probe = source.probe;
        }
        if source.username.is_some() {
            target.username.clone_from(&source.username);
        }
        if source.password.is_some() {
            target.password.clone_from(&source.password);
        }
    }
}
