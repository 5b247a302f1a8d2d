//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use senslink_common::config::WatchdogConfig;
use senslink_common::error::{Error, Result};

/// Bridge client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bridge server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bridge server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between reconnect attempts. Flat interval, retried
    /// indefinitely.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Interval between `get_data` polls while connected.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the inbound line ring buffer.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Client-side liveness watchdog settings.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_buffer_capacity() -> usize {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            buffer_capacity: default_buffer_capacity(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Server address in `host:port` form.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.watchdog.validate()?;

        if self.host.is_empty() {
            return Err(Error::validation("client host must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::validation("poll interval must be positive"));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::validation("buffer capacity must be positive"));
        }

        Ok(())
    }
}
