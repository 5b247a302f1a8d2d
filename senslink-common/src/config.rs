use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Watchdog timing configuration, shared by the server and the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between demotion sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: f64,

    /// Seconds of silence after which a sensor is demoted to unavailable.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_sweep_interval_secs() -> f64 {
    1.0
}

fn default_timeout_secs() -> f64 {
    5.0
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl WatchdogConfig {
    /// Validate the timing relationship between sweep interval and timeout.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs <= 0.0 {
            return Err(Error::validation("watchdog sweep interval must be positive"));
        }
        if self.timeout_secs <= self.sweep_interval_secs {
            return Err(Error::validation(
                "watchdog timeout must exceed the sweep interval",
            ));
        }
        Ok(())
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(json5::from_str(&content)?)
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    Ok(json5::from_str(content)?)
}
