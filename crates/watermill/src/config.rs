//! Configuration types for the water mill
//!
//! Configuration is layered with `figment`: an optional YAML file, overridden
//! by environment variables prefixed with `WATERMILL_` where `__` separates
//! nesting levels (`WATERMILL_BROKER__POLL_TIMEOUT_MS=250`).

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::broker::MemoryBrokerConfig;
use crate::error::{MillError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WaterMillConfig {
    /// Engine settings
    #[serde(default)]
    pub mill: MillSettings,

    /// In-memory broker settings
    #[serde(default)]
    pub broker: MemoryBrokerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WaterMillConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("WATERMILL_").split("__"));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.broker.poll_timeout_ms == 0 {
            return Err(MillError::configuration(
                "broker.poll_timeout_ms must be greater than 0",
            ));
        }

        self.logging.validate()
    }
}

/// What happens to a root element whose joined stream ran ahead
///
/// Only relevant without a window; windowed mills always keep the element.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RanAheadPolicy {
    /// Drop the root element with a warning
    #[default]
    SkipRoot,
    /// Invoke the callback with the children joined so far
    ProcessPartial,
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MillSettings {
    /// Treatment of root elements whose joined stream ran ahead
    #[serde(default)]
    pub ran_ahead_policy: RanAheadPolicy,

    /// Check the join tree against the broker's streams when building
    #[serde(default = "default_true")]
    pub validate_streams: bool,
}

impl Default for MillSettings {
    fn default() -> Self {
        Self {
            ran_ahead_policy: RanAheadPolicy::default(),
            validate_streams: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human readable
    Pretty,
    /// Single-line, human readable
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `watermill=debug,info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.level.trim().is_empty() {
            return Err(MillError::configuration("logging.level must not be empty"));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = WaterMillConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mill.ran_ahead_policy, RanAheadPolicy::SkipRoot);
        assert!(config.mill.validate_streams);
        assert_eq!(config.broker.poll_timeout_ms, 100);
    }

    #[test]
    fn test_zero_poll_timeout_rejected() {
        let mut config = WaterMillConfig::default();
        config.broker.poll_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(MillError::Configuration { .. })
        ));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mill:\n  ran_ahead_policy: process_partial\nbroker:\n  poll_timeout_ms: 250\nlogging:\n  format: json"
        )
        .unwrap();

        let config = WaterMillConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.mill.ran_ahead_policy, RanAheadPolicy::ProcessPartial);
        assert!(config.mill.validate_streams);
        assert_eq!(config.broker.poll_timeout_ms, 250);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: MillSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, MillSettings::default());
    }
}
