//! Wire protocol for the bridge TCP link.
//!
//! Messages travel as newline-delimited JSON over a persistent connection.
//! Every message kind is a closed tagged enum validated on receipt; a payload
//! with an unknown `type` tag fails decoding and is handled by the endpoint
//! (logged, answered with an error reply server-side) without dropping the
//! connection.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// A single entry in the shared event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEntry {
    /// A header announcement. Emitted for every header line the source
    /// produces; receivers treat repeats of a known name as keepalives.
    Discovery {
        sensor_name: String,
        pins: Vec<String>,
        payload: String,
        timestamp: f64,
    },

    /// A per-cycle telemetry update.
    SensorData {
        sensor_name: String,
        values: Vec<f64>,
        timestamp: f64,
    },
}

impl EventEntry {
    /// The sensor this entry belongs to.
    pub fn sensor_name(&self) -> &str {
        match self {
            EventEntry::Discovery { sensor_name, .. } => sensor_name,
            EventEntry::SensorData { sensor_name, .. } => sensor_name,
        }
    }

    /// Epoch-seconds timestamp of the entry.
    pub fn timestamp(&self) -> f64 {
        match self {
            EventEntry::Discovery { timestamp, .. } => *timestamp,
            EventEntry::SensorData { timestamp, .. } => *timestamp,
        }
    }

    /// Render the entry back into the serial line form it was parsed from.
    pub fn to_line(&self) -> String {
        match self {
            EventEntry::Discovery {
                sensor_name,
                pins,
                payload,
                ..
            } => format!("*H*_{}_{}_{}", sensor_name, pins.join(","), payload),
            EventEntry::SensorData {
                sensor_name,
                values,
                ..
            } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("{}:{}", sensor_name, rendered.join(","))
            }
        }
    }
}

/// Requests a client may send to the bridge server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Fetch all entries accumulated since this connection's cursor.
    GetData { request_id: u64 },
}

/// Messages the bridge server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to a [`ClientRequest::GetData`].
    DataResponse {
        request_id: u64,
        data_count: usize,
        data: Vec<EventEntry>,
    },

    /// Unsolicited push of new entries since the connection's cursor.
    PeriodicUpdate {
        data_count: usize,
        data: Vec<EventEntry>,
    },

    /// Unsolicited health push: source connectivity and registry size.
    ServerStatus {
        serial_connected: bool,
        sensors: usize,
    },

    /// Reply to a malformed or unrecognized request.
    ErrorResponse { error: String },
}

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Current time as fractional seconds since the Unix epoch.
///
/// Returns 0.0 if system time is before the epoch (should never happen in
/// practice).
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
