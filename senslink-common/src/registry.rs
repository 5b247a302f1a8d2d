//! Shared sensor registry.
//!
//! The registry is an explicitly owned state object: the bridge (or client)
//! constructs exactly one and hands out `Arc` references to the parser, the
//! watchdog, and the server. Records are created on first sight and never
//! removed for the lifetime of the session. Exactly two actors mutate a
//! record: the observation paths (last_seen, payload, promotion to available)
//! and the watchdog sweep (demotion to unavailable).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::protocol::epoch_secs;

/// State kept for one discovered sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    /// Sensor name, the sole identity.
    pub name: String,
    /// Pin assignment, set once at first discovery and immutable afterwards.
    pub pins: Vec<String>,
    /// Most recent header payload.
    pub last_payload: String,
    /// Epoch seconds of the first observation.
    pub first_seen: f64,
    /// Epoch seconds of the most recent observation (local receipt time).
    pub last_seen: f64,
    /// Liveness state maintained by the watchdog.
    pub available: bool,
}

impl SensorRecord {
    fn new(name: &str, pins: &[String], payload: &str) -> Self {
        let now = epoch_secs();
        Self {
            name: name.to_string(),
            pins: pins.to_vec(),
            last_payload: payload.to_string(),
            first_seen: now,
            last_seen: now,
            available: true,
        }
    }
}

/// Registry of every sensor seen during the session.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: RwLock<HashMap<String, SensorRecord>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header observation.
    ///
    /// An unseen name creates a record; a known name is a keepalive that
    /// refreshes last_seen and the payload only (pins never change after
    /// first discovery). Either way the sensor is promoted to available
    /// immediately. Returns `true` when the sensor is new.
    pub fn observe_header(&self, name: &str, pins: &[String], payload: &str) -> bool {
        let mut sensors = self.sensors.write().unwrap();
        match sensors.get_mut(name) {
            Some(record) => {
                record.last_seen = epoch_secs();
                record.last_payload = payload.to_string();
                promote(record);
                false
            }
            None => {
                sensors.insert(name.to_string(), SensorRecord::new(name, pins, payload));
                true
            }
        }
    }

    /// Record a data observation, implicitly registering unknown names with
    /// an empty pin list. Promotes the sensor to available immediately.
    /// Returns `true` when the sensor is new.
    pub fn observe_data(&self, name: &str) -> bool {
        let mut sensors = self.sensors.write().unwrap();
        match sensors.get_mut(name) {
            Some(record) => {
                record.last_seen = epoch_secs();
                promote(record);
                false
            }
            None => {
                sensors.insert(name.to_string(), SensorRecord::new(name, &[], ""));
                true
            }
        }
    }

    /// Demote sensors whose last observation is older than `timeout`.
    ///
    /// Only the watchdog calls this; it never touches pins, payload, or
    /// identity. Returns the names demoted by this pass.
    pub fn demote_silent(&self, timeout: Duration) -> Vec<String> {
        let now = epoch_secs();
        let cutoff = timeout.as_secs_f64();
        let mut demoted = Vec::new();

        let mut sensors = self.sensors.write().unwrap();
        for record in sensors.values_mut() {
            if record.available && now - record.last_seen > cutoff {
                record.available = false;
                demoted.push(record.name.clone());
            }
        }

        demoted
    }

    /// Whether a sensor is currently available. Unknown names are not.
    pub fn is_available(&self, name: &str) -> bool {
        self.sensors
            .read()
            .unwrap()
            .get(name)
            .is_some_and(|r| r.available)
    }

    /// Whether a sensor has ever been seen.
    pub fn contains(&self, name: &str) -> bool {
        self.sensors.read().unwrap().contains_key(name)
    }

    /// Copy of a single record.
    pub fn get(&self, name: &str) -> Option<SensorRecord> {
        self.sensors.read().unwrap().get(name).cloned()
    }

    /// All known sensor names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sensors.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every record.
    pub fn snapshot(&self) -> Vec<SensorRecord> {
        let mut records: Vec<SensorRecord> =
            self.sensors.read().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Number of sensors seen so far.
    pub fn len(&self) -> usize {
        self.sensors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().unwrap().is_empty()
    }
}

fn promote(record: &mut SensorRecord) {
    if !record.available {
        record.available = true;
        tracing::debug!(sensor = %record.name, "Sensor promoted to available");
    }
}
