//! Bridge daemon configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use senslink_common::config::{LoggingConfig, WatchdogConfig, load_config};
use senslink_common::error::{Error, Result};

/// Complete bridge daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Which line source to construct.
    #[serde(default)]
    pub source: SourceMode,

    /// Serial device settings.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Mock source settings.
    #[serde(default)]
    pub mock: MockConfig,

    /// Liveness watchdog settings.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// TCP bridge server settings.
    #[serde(default)]
    pub server: ListenConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Line source selection, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Real hardware over a serial port.
    #[default]
    Serial,
    /// Synthetic generator, no hardware needed.
    Mock,
}

/// Serial device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g. "/dev/ttyUSB0"). When absent, auto-detection scans
    /// candidate ports and picks the highest-confidence match.
    pub port: Option<String>,

    /// Baud rate (8N1 framing).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-read timeout in milliseconds. Bounds how long the read loop
    /// blocks before it re-checks the stop signal.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Delay before a reconnect attempt after an I/O error. Flat interval,
    /// retried indefinitely.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Mock source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Per-sensor emission rate in lines per second.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,

    /// Every K-th message per sensor is a header; the rest are data lines.
    #[serde(default = "default_header_every")]
    pub header_every: u64,

    /// Seed for the randomized walk. Unset means entropy-seeded.
    pub seed: Option<u64>,
}

fn default_rate_hz() -> f64 {
    10.0
}

fn default_header_every() -> u64 {
    10
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            header_every: default_header_every(),
            seed: None,
        }
    }
}

/// TCP bridge server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Bind address for the bridge protocol.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Interval between unsolicited pushes to each connection.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,

    /// Capacity of the shared event log. Oldest entries are evicted first.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,

    /// Capacity of the raw-line introspection buffer.
    #[serde(default = "default_line_buffer_capacity")]
    pub line_buffer_capacity: usize,

    /// Interval between periodic status log lines, in seconds.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:9999".to_string()
}

fn default_push_interval_ms() -> u64 {
    2000
}

fn default_event_log_capacity() -> usize {
    4096
}

fn default_line_buffer_capacity() -> usize {
    1000
}

fn default_status_interval_secs() -> u64 {
    30
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            push_interval_ms: default_push_interval_ms(),
            event_log_capacity: default_event_log_capacity(),
            line_buffer_capacity: default_line_buffer_capacity(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl ListenConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

impl ServerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(Error::ConfigNotFound { .. }) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.watchdog.validate()?;

        if !self.server.bind.contains(':') {
            return Err(Error::validation(
                "server bind address must include a port (e.g. '127.0.0.1:9999')",
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::validation("serial baud rate must be positive"));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(Error::validation("serial read timeout must be positive"));
        }
        if self.mock.rate_hz <= 0.0 {
            return Err(Error::validation("mock rate must be positive"));
        }
        if self.mock.header_every == 0 {
            return Err(Error::validation("mock header cadence must be positive"));
        }
        if self.server.event_log_capacity == 0 {
            return Err(Error::validation("event log capacity must be positive"));
        }

        Ok(())
    }
}
