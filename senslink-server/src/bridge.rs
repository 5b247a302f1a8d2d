//! Bridge assembly and lifecycle.
//!
//! Wires the line source, parser, registry, watchdog, and TCP server
//! together and manages startup and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use senslink_common::buffer::LineBuffer;
use senslink_common::error::Result;
use senslink_common::protocol::{EventEntry, epoch_secs};
use senslink_common::registry::SensorRegistry;
use senslink_common::watchdog::WatchdogManager;

use crate::config::{ServerConfig, SourceMode};
use crate::log::EventLog;
use crate::mock::MockSource;
use crate::parser::{self, ParsedLine};
use crate::serial::SerialLineSource;
use crate::server;
use crate::source::{LineSource, SourceHealth};

/// Shared state of one bridge instance: the sensor registry, the event log,
/// the raw-line buffer, and source health. Constructed once and handed out
/// by `Arc` to the read loop, the watchdog, and the server.
#[derive(Debug)]
pub struct BridgeState {
    pub registry: Arc<SensorRegistry>,
    pub events: EventLog,
    pub lines: LineBuffer,
    pub health: SourceHealth,
    clients: AtomicUsize,
}

impl BridgeState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(SensorRegistry::new()),
            events: EventLog::new(config.server.event_log_capacity),
            lines: LineBuffer::new(config.server.line_buffer_capacity),
            health: SourceHealth::new(),
            clients: AtomicUsize::new(0),
        }
    }

    /// Feed one raw serial line through the buffer, the parser, and the
    /// registry, appending structured events to the log.
    ///
    /// The raw line is retained in the buffer even when parsing fails; a
    /// parse failure produces no event and is warn-logged.
    pub fn ingest_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        self.lines.push(line);

        match parser::parse_line(line) {
            Some(ParsedLine::Header {
                name,
                pins,
                payload,
            }) => {
                let is_new = self.registry.observe_header(&name, &pins, &payload);
                if is_new {
                    tracing::info!(sensor = %name, pins = ?pins, "New sensor discovered");
                }
                // Every header lands in the log; receivers treat repeats of
                // a known name as keepalives. Late-joining clients learn of
                // existing sensors from the next re-announcement.
                self.events.append(EventEntry::Discovery {
                    sensor_name: name,
                    pins,
                    payload,
                    timestamp: epoch_secs(),
                });
            }
            Some(ParsedLine::Data { name, values }) => {
                let is_new = self.registry.observe_data(&name);
                if is_new {
                    tracing::debug!(sensor = %name, "Sensor implicitly registered from data line");
                }
                self.events.append(EventEntry::SensorData {
                    sensor_name: name,
                    values,
                    timestamp: epoch_secs(),
                });
            }
            None => {
                tracing::warn!(line = %line, "Dropped unparseable serial line");
            }
        }
    }

    pub fn client_connected(&self) {
        self.clients.fetch_add(1, Ordering::SeqCst);
    }

    pub fn client_disconnected(&self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }
}

/// A running bridge: source loop, watchdog, TCP server, status logging.
pub struct SensorBridge {
    state: Arc<BridgeState>,
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SensorBridge {
    /// Bind the server, construct the configured source, and spawn all
    /// loops. Returns once the bridge is accepting connections.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let state = Arc::new(BridgeState::new(&config));
        let (stop_tx, stop_rx) = watch::channel(false);

        let source = build_source(&config);
        tracing::info!(source = %source.describe(), "Starting sensor bridge");

        let listener = TcpListener::bind(&config.server.bind).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Bridge server listening");

        let watchdog = WatchdogManager::new(state.registry.clone(), &config.watchdog);

        let tasks = vec![
            tokio::spawn(run_source_loop(source, state.clone(), stop_rx.clone())),
            tokio::spawn(watchdog.run(stop_rx.clone())),
            tokio::spawn(server::run(
                listener,
                state.clone(),
                config.server.push_interval(),
                stop_rx.clone(),
            )),
            tokio::spawn(run_status_loop(
                state.clone(),
                config.server.status_interval(),
                stop_rx,
            )),
        ];

        Ok(Self {
            state,
            local_addr,
            stop: stop_tx,
            tasks,
        })
    }

    /// Shared state handle (registry, event log, line buffer, health).
    pub fn state(&self) -> Arc<BridgeState> {
        self.state.clone()
    }

    /// The address the bridge server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal every loop to stop and wait for them with a bounded join;
    /// stragglers are aborted.
    pub async fn shutdown(self) {
        tracing::info!("Stopping sensor bridge");
        let _ = self.stop.send(true);

        for mut task in self.tasks {
            if tokio::time::timeout(Duration::from_secs(2), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }

        tracing::info!("Sensor bridge stopped");
    }
}

fn build_source(config: &ServerConfig) -> LineSource {
    match config.source {
        SourceMode::Serial => LineSource::Serial(SerialLineSource::new(config.serial.clone())),
        SourceMode::Mock => LineSource::Mock(MockSource::new(&config.mock)),
    }
}

/// Read lines from the source and feed them into the bridge state. On I/O
/// failure the source reconnects at its flat interval, indefinitely, until
/// the stop signal flips.
async fn run_source_loop(
    mut source: LineSource,
    state: Arc<BridgeState>,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!(source = %source.describe(), "Source read loop started");

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            result = source.next_line() => match result {
                Ok(Some(line)) => {
                    state.health.set_connected(true);
                    if !line.is_empty() {
                        state.health.record_line();
                        state.ingest_line(&line);
                    }
                }
                Ok(None) => {
                    state.health.set_connected(source.is_connected());
                }
                Err(e) => {
                    state.health.set_connected(false);
                    tracing::warn!(error = %e, "Source read failed, reconnecting");
                    if let Err(e) = source.reconnect().await {
                        tracing::debug!(error = %e, "Reconnect attempt failed");
                    }
                }
            }
        }
    }

    tracing::info!("Source read loop stopped");
}

/// Periodic status log line, the bridge's own heartbeat.
async fn run_status_loop(
    state: Arc<BridgeState>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                tracing::info!(
                    serial_connected = state.health.is_connected(),
                    lines_read = state.health.lines_read(),
                    buffered_lines = state.lines.len(),
                    sensors = state.registry.len(),
                    clients = state.client_count(),
                    "Bridge status"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> BridgeState {
        BridgeState::new(&ServerConfig::default())
    }

    #[test]
    fn test_header_then_data_scenario() {
        let state = state();

        state.ingest_line("*H*_temperature_A0_temp:25.5C");
        state.ingest_line("temperature:25.6");

        let (entries, _) = state.events.since(0);
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            EventEntry::Discovery {
                sensor_name,
                pins,
                payload,
                ..
            } => {
                assert_eq!(sensor_name, "temperature");
                assert_eq!(pins, &vec!["A0"]);
                assert_eq!(payload, "temp:25.5C");
            }
            other => panic!("expected discovery first, got {:?}", other),
        }
        match &entries[1] {
            EventEntry::SensorData {
                sensor_name,
                values,
                ..
            } => {
                assert_eq!(sensor_name, "temperature");
                assert_eq!(values, &vec![25.6]);
            }
            other => panic!("expected data entry, got {:?}", other),
        }

        let record = state.registry.get("temperature").unwrap();
        assert_eq!(record.pins, vec!["A0"]);
        assert_eq!(record.last_payload, "temp:25.5C");
    }

    #[test]
    fn test_repeated_header_appends_keepalive_entry() {
        let state = state();

        state.ingest_line("*H*_temperature_A0_temp:25.5C");
        state.ingest_line("*H*_temperature_A0_temp:25.7C");

        // Both headers land in the log so late joiners hear about the
        // sensor, but the registry holds a single record.
        assert_eq!(state.events.len(), 2);
        assert_eq!(state.registry.len(), 1);
    }

    #[test]
    fn test_malformed_line_buffered_but_no_event() {
        let state = state();

        state.ingest_line("temperature25.6");

        assert!(state.events.is_empty());
        assert_eq!(state.registry.len(), 0);
        assert_eq!(state.lines.recent(1), vec!["temperature25.6"]);
    }

    #[test]
    fn test_data_for_unknown_sensor_implicitly_registers() {
        let state = state();

        state.ingest_line("pressure:1013.2");

        assert!(state.registry.contains("pressure"));
        let record = state.registry.get("pressure").unwrap();
        assert!(record.pins.is_empty());
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn test_empty_lines_ignored() {
        let state = state();
        state.ingest_line("");
        state.ingest_line("   ");
        assert!(state.events.is_empty());
        assert!(state.lines.is_empty());
    }

    #[test]
    fn test_client_counter() {
        let state = state();
        state.client_connected();
        state.client_connected();
        state.client_disconnected();
        assert_eq!(state.client_count(), 1);
    }
}
