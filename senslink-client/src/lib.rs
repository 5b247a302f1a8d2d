//! SensLink bridge client.
//!
//! Consumer-side facade over the bridge TCP protocol. The client maintains
//! its own connection (flat-interval reconnect, never fatal), tracks every
//! sensor the bridge announces, buffers recent lines for introspection, and
//! drives registered callbacks from a single dispatch routine.
//!
//! Sensors discovered once are retained for the whole session, across
//! server disconnects; prolonged silence turns a sensor unavailable, not
//! absent.
//!
//! # Example
//!
//! ```ignore
//! use senslink_client::{BridgeClient, ClientConfig};
//!
//! let client = BridgeClient::start(ClientConfig::default())?;
//! client.set_discovery_callback(|name, pins, _payload| {
//!     println!("discovered {name} on {pins:?}");
//! });
//! client.register_data_callback("temperature", |values| {
//!     println!("temperature: {values:?}");
//! });
//! ```

pub mod client;
pub mod config;

pub use client::{
    BridgeClient, ConnectionState, ConnectionStatus, DataCallback, DiscoveryCallback,
};
pub use config::ClientConfig;
