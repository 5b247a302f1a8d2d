//! SensLink Common Library
//!
//! Shared types and utilities for the SensLink sensor bridge:
//!
//! - [`protocol`] - TCP wire protocol messages and event entries
//! - [`registry`] - Session-wide sensor registry
//! - [`watchdog`] - Liveness watchdog (available/unavailable)
//! - [`buffer`] - Bounded ring buffer of recent raw lines
//! - [`config`] - Configuration primitives (JSON5 format)
//! - [`error`] - Error types

pub mod buffer;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod watchdog;

// Re-export commonly used types at the crate root
pub use buffer::{LineBuffer, LineBufferEntry};
pub use config::{LogFormat, LoggingConfig, WatchdogConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use protocol::{ClientRequest, EventEntry, ServerMessage, encode_line, epoch_secs};
pub use registry::{SensorRecord, SensorRegistry};
pub use watchdog::WatchdogManager;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// # Example
///
/// ```ignore
/// use senslink_common::{LoggingConfig, init_tracing};
///
/// let config = LoggingConfig::default();
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
