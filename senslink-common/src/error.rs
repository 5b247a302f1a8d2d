use thiserror::Error;

/// Common error type for SensLink components.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// No candidate serial device was found during auto-detection.
    #[error("No candidate serial device found")]
    NoDeviceFound,

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(String),

    /// TCP connection error between client and server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Line grammar parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Wire protocol error (malformed or unknown message).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a serial port error.
    pub fn serial(msg: impl Into<String>) -> Self {
        Self::Serial(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<json5::Error> for Error {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

/// Result type alias using SensLink's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
