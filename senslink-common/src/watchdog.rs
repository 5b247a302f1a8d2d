//! Liveness watchdog.
//!
//! Converts prolonged silence into an Unavailable state. Demotion happens
//! only on the periodic sweep; promotion back to Available is performed by
//! the registry observation paths the moment a new event arrives, so a
//! recovering sensor never waits for the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::WatchdogConfig;
use crate::registry::SensorRegistry;

/// Periodically demotes sensors that have gone silent past a timeout.
pub struct WatchdogManager {
    registry: Arc<SensorRegistry>,
    timeout: Duration,
    sweep_interval: Duration,
}

impl WatchdogManager {
    /// Create a watchdog over a shared registry.
    ///
    /// The configuration must have been validated: the timeout must exceed
    /// the sweep interval.
    pub fn new(registry: Arc<SensorRegistry>, config: &WatchdogConfig) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs_f64(config.timeout_secs),
            sweep_interval: Duration::from_secs_f64(config.sweep_interval_secs),
        }
    }

    /// One demotion pass. Returns the names demoted.
    pub fn sweep(&self) -> Vec<String> {
        let demoted = self.registry.demote_silent(self.timeout);
        for name in &demoted {
            tracing::warn!(
                sensor = %name,
                timeout_secs = self.timeout.as_secs_f64(),
                "Sensor went silent, marking unavailable"
            );
        }
        demoted
    }

    /// Run sweeps until the stop signal flips.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::debug!(
            sweep_secs = self.sweep_interval.as_secs_f64(),
            timeout_secs = self.timeout.as_secs_f64(),
            "Watchdog started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Watchdog stopped");
    }
}
