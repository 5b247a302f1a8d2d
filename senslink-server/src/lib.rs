//! SensLink bridge daemon.
//!
//! Turns raw line-oriented serial output from a microcontroller into
//! structured discovery/data events and relays them over a newline-delimited
//! JSON TCP protocol. A synthetic mock source can stand in for real
//! hardware; downstream consumers cannot tell the difference.
//!
//! # Line grammar
//!
//! ```text
//! *H*_<name>_<pin,pin,...>_<payload>     (header)
//! <name>:<v1>,<v2>,...                   (data)
//! ```

pub mod bridge;
pub mod config;
pub mod log;
pub mod mock;
pub mod parser;
pub mod serial;
pub mod server;
pub mod source;

pub use bridge::{BridgeState, SensorBridge};
pub use config::{ServerConfig, SourceMode};
