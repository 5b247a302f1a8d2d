//! Synthetic line source for development without hardware.
//!
//! Emits the exact serial grammar real firmware produces (a header every
//! K-th message per sensor, data lines otherwise), so downstream components
//! cannot distinguish it from a device. Each simulated sensor advances
//! independently via a small randomized walk.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::{Interval, MissedTickBehavior};

use senslink_common::error::Result;

use crate::config::MockConfig;

/// One simulated value channel of a sensor.
#[derive(Debug, Clone)]
struct SimulatedField {
    label: &'static str,
    unit: &'static str,
    value: f64,
    step: f64,
    min: f64,
    max: f64,
}

/// One simulated sensor.
#[derive(Debug, Clone)]
struct SimulatedSensor {
    name: &'static str,
    pins: &'static [&'static str],
    fields: Vec<SimulatedField>,
    messages: u64,
}

/// Synthetic stand-in for real hardware.
pub struct MockSource {
    sensors: Vec<SimulatedSensor>,
    rng: SmallRng,
    ticker: Interval,
    header_every: u64,
    cursor: usize,
}

impl MockSource {
    pub fn new(config: &MockConfig) -> Self {
        let sensors = default_sensors();

        // One line per tick, round-robin across sensors, so each sensor
        // individually emits at the configured rate.
        let period = Duration::from_secs_f64(1.0 / (config.rate_hz * sensors.len() as f64));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Self {
            sensors,
            rng,
            ticker,
            header_every: config.header_every.max(1),
            cursor: 0,
        }
    }

    /// Whether the synthetic device is "connected". Always true.
    pub fn is_connected(&self) -> bool {
        true
    }

    pub fn describe(&self) -> String {
        format!("mock ({} sensors)", self.sensors.len())
    }

    /// Produce the next line at the configured cadence.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.ticker.tick().await;
        Ok(Some(self.emit_next()))
    }

    /// Synthesize one line without waiting for the ticker.
    pub fn emit_next(&mut self) -> String {
        let idx = self.cursor;
        self.cursor = (self.cursor + 1) % self.sensors.len();

        let sensor = &mut self.sensors[idx];
        for field in &mut sensor.fields {
            let delta = self.rng.gen_range(-field.step..=field.step);
            field.value = (field.value + delta).clamp(field.min, field.max);
        }

        let payload: Vec<String> = sensor
            .fields
            .iter()
            .map(|f| format!("{}:{}{}", f.label, round2(f.value), f.unit))
            .collect();
        let payload = payload.join(",");

        let line = if sensor.messages % self.header_every == 0 {
            format!("*H*_{}_{}_{}", sensor.name, sensor.pins.join(","), payload)
        } else {
            format!("{}:{}", sensor.name, payload)
        };

        sensor.messages += 1;
        line
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn field(
    label: &'static str,
    unit: &'static str,
    value: f64,
    step: f64,
    min: f64,
    max: f64,
) -> SimulatedField {
    SimulatedField {
        label,
        unit,
        value,
        step,
        min,
        max,
    }
}

fn default_sensors() -> Vec<SimulatedSensor> {
    vec![
        SimulatedSensor {
            name: "temperature",
            pins: &["A0"],
            fields: vec![field("temp", "C", 25.5, 0.3, 15.0, 35.0)],
            messages: 0,
        },
        SimulatedSensor {
            name: "accelerometer",
            pins: &["A1", "D2", "D3"],
            fields: vec![
                field("x", "", 0.02, 0.05, -1.0, 1.0),
                field("y", "", -0.01, 0.05, -1.0, 1.0),
                field("z", "", 9.81, 0.05, 9.0, 10.5),
            ],
            messages: 0,
        },
        SimulatedSensor {
            name: "pressure",
            pins: &["A2"],
            fields: vec![field("pressure", "hPa", 1013.25, 1.5, 980.0, 1050.0)],
            messages: 0,
        },
    ]
}
