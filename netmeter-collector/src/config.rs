//! Configuration for the collector.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use netmeter_common::{Format, LoggingConfig, load_config, parse_config};

use crate::labels::Label;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] netmeter_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete collector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetmeterConfig {
    /// Aggregation settings.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Scheduled reporting settings.
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Aggregation settings consumed by [`crate::Monitoring`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// When false, every collection returns no data points.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base prefix for metric names (default: none).
    #[serde(default)]
    pub prefix: String,

    /// Active label dimensions. Any subset is valid, including none.
    #[serde(default = "default_labels")]
    pub labels: Vec<Label>,
}

fn default_enabled() -> bool {
    true
}

fn default_labels() -> Vec<Label> {
    vec![Label::Remote, Label::PoolType, Label::PoolName]
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            prefix: String::new(),
            labels: default_labels(),
        }
    }
}

/// Scheduled reporting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Seconds between collection passes.
    #[serde(default = "default_schedule")]
    pub schedule_secs: u64,

    /// Maximum data points handed to the sink at once.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Encoding used by writer sinks.
    #[serde(default)]
    pub format: Format,
}

fn default_schedule() -> u64 {
    10
}

fn default_batch_size() -> usize {
    500
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            schedule_secs: default_schedule(),
            batch_size: default_batch_size(),
            format: Format::default(),
        }
    }
}

impl NetmeterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: NetmeterConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: NetmeterConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reporter.schedule_secs == 0 {
            return Err(ConfigError::Validation(
                "schedule_secs must be > 0".to_string(),
            ));
        }

        if self.reporter.batch_size == 0 {
            return Err(ConfigError::Validation(
                "batch_size must be > 0".to_string(),
            ));
        }

        let prefix = &self.monitoring.prefix;
        if prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "Metric prefix must not contain whitespace: '{}'",
                prefix
            )));
        }
        if prefix.starts_with('.') || prefix.ends_with('.') {
            return Err(ConfigError::Validation(format!(
                "Metric prefix must not start or end with '.': '{}'",
                prefix
            )));
        }

        Ok(())
    }
}
