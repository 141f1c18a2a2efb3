//! Configuration schema definitions

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bundling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Readable output with per-module comments
    Development,

    /// Minified output
    #[default]
    Production,
}

impl Mode {
    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output directory, relative to the config file
    #[serde(default = "default_output_dir")]
    pub path: String,

    /// Bundle file name. Supports `[name]` and `[contenthash]`.
    #[serde(default = "default_filename")]
    pub filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_dir(),
            filename: default_filename(),
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_filename() -> String {
    "main.js".to_string()
}

/// Experimental feature switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentsConfig {
    /// Treat `.wasm` files as asynchronously loaded modules
    #[serde(default, alias = "asyncWebAssembly")]
    pub async_web_assembly: bool,
}

/// A single experimental feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Experiment {
    AsyncWebAssembly,
}

/// Watch mode tuning, as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchOptionsConfig {
    /// Milliseconds to wait after the last change before rebuilding
    #[serde(default = "default_aggregate_timeout", alias = "aggregateTimeout")]
    pub aggregate_timeout: i64,

    /// Milliseconds between file system polls
    #[serde(default = "default_poll")]
    pub poll: i64,
}

impl Default for WatchOptionsConfig {
    fn default() -> Self {
        Self {
            aggregate_timeout: default_aggregate_timeout(),
            poll: default_poll(),
        }
    }
}

fn default_aggregate_timeout() -> i64 {
    20
}

fn default_poll() -> i64 {
    1000
}

/// Validated watch settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchSettings {
    aggregate_timeout_ms: u64,
    poll_interval_ms: u64,
}

impl WatchSettings {
    pub fn new(aggregate_timeout_ms: i64, poll_interval_ms: i64) -> Result<Self, ConfigError> {
        if poll_interval_ms <= 0 {
            return Err(ConfigError::InvalidPollInterval(poll_interval_ms));
        }
        if aggregate_timeout_ms < 0 {
            return Err(ConfigError::InvalidAggregateTimeout(aggregate_timeout_ms));
        }

        Ok(Self {
            aggregate_timeout_ms: aggregate_timeout_ms as u64,
            poll_interval_ms: poll_interval_ms as u64,
        })
    }

    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregate_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TryFrom<&WatchOptionsConfig> for WatchSettings {
    type Error = ConfigError;

    fn try_from(options: &WatchOptionsConfig) -> Result<Self, Self::Error> {
        Self::new(options.aggregate_timeout, options.poll)
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,

    /// Plugin-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Table>,
}

/// Options accepted by the `copy` plugin
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyOptions {
    pub patterns: Vec<String>,
}
