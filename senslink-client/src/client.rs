//! Consumer-side bridge client.
//!
//! [`BridgeClient`] maintains the TCP link to the bridge server and presents
//! one stable surface regardless of what feeds the server (real hardware or
//! the mock source). Two concurrent intake paths, periodic `get_data`
//! polling and passive receipt of unsolicited pushes, funnel into a single
//! dispatch routine.
//!
//! # Callback contract
//!
//! Callbacks run synchronously on the dispatch task. They are required to be
//! fast and non-blocking; the dispatch path applies no internal timeout to
//! protect against a slow callback. Anything expensive belongs on the
//! caller's own executor.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use senslink_common::buffer::LineBuffer;
use senslink_common::error::{Error, Result};
use senslink_common::protocol::{ClientRequest, EventEntry, ServerMessage, encode_line};
use senslink_common::registry::SensorRegistry;
use senslink_common::watchdog::WatchdogManager;

use crate::config::ClientConfig;

/// Discovery callback: `(name, pins, payload)`.
pub type DiscoveryCallback = Arc<dyn Fn(&str, &[String], &str) + Send + Sync>;

/// Per-sensor data callback: ordered values of one data event.
pub type DataCallback = Arc<dyn Fn(&[f64]) + Send + Sync>;

/// State of the client-server TCP link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the client's view of the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    /// Whether the TCP link to the bridge server is up.
    pub connected: bool,
    /// Whether the bridge reports its device as connected.
    pub serial_connected: bool,
    /// Registry size last reported by the bridge.
    pub sensors: usize,
    /// Most recent connection error, if any.
    pub last_error: Option<String>,
}

/// Shared state between the public facade and the background tasks.
struct ClientShared {
    registry: Arc<SensorRegistry>,
    buffer: LineBuffer,
    state: RwLock<ConnectionState>,
    last_error: Mutex<Option<String>>,
    serial_connected: AtomicBool,
    server_sensors: AtomicUsize,
    discovery_cb: RwLock<Option<DiscoveryCallback>>,
    data_cbs: RwLock<HashMap<String, DataCallback>>,
    announced: Mutex<HashSet<String>>,
}

impl ClientShared {
    fn new(config: &ClientConfig) -> Self {
        Self {
            registry: Arc::new(SensorRegistry::new()),
            buffer: LineBuffer::new(config.buffer_capacity),
            state: RwLock::new(ConnectionState::Disconnected),
            last_error: Mutex::new(None),
            serial_connected: AtomicBool::new(false),
            server_sensors: AtomicUsize::new(0),
            discovery_cb: RwLock::new(None),
            data_cbs: RwLock::new(HashMap::new()),
            announced: Mutex::new(HashSet::new()),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap() = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    fn record_error(&self, error: impl Into<String>) {
        *self.last_error.lock().unwrap() = Some(error.into());
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap() = None;
    }

    /// The single dispatch routine. Both intake paths end up here.
    fn dispatch_entries(&self, entries: Vec<EventEntry>) {
        for entry in entries {
            self.buffer.push(&entry.to_line());

            match entry {
                EventEntry::Discovery {
                    sensor_name,
                    pins,
                    payload,
                    ..
                } => {
                    self.registry.observe_header(&sensor_name, &pins, &payload);

                    // The discovery callback fires exactly once per newly
                    // seen name, even though the server re-announces headers
                    // as keepalives.
                    let newly_announced = self.announced.lock().unwrap().insert(sensor_name.clone());
                    if newly_announced {
                        tracing::info!(sensor = %sensor_name, pins = ?pins, "New sensor discovered");
                        // Clone the callback out so none of our locks are
                        // held while user code runs.
                        let cb = self.discovery_cb.read().unwrap().clone();
                        if let Some(cb) = cb {
                            cb(&sensor_name, &pins, &payload);
                        }
                    }
                }
                EventEntry::SensorData {
                    sensor_name,
                    values,
                    ..
                } => {
                    self.registry.observe_data(&sensor_name);

                    let cb = self.data_cbs.read().unwrap().get(&sensor_name).cloned();
                    if let Some(cb) = cb {
                        cb(&values);
                    }
                }
            }
        }
    }

    fn dispatch_message(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        match serde_json::from_str::<ServerMessage>(line) {
            Ok(ServerMessage::DataResponse {
                request_id, data, ..
            }) => {
                tracing::trace!(request_id, count = data.len(), "Data response");
                self.dispatch_entries(data);
            }
            Ok(ServerMessage::PeriodicUpdate { data, .. }) => {
                self.dispatch_entries(data);
            }
            Ok(ServerMessage::ServerStatus {
                serial_connected,
                sensors,
            }) => {
                self.serial_connected.store(serial_connected, Ordering::SeqCst);
                self.server_sensors.store(sensors, Ordering::SeqCst);
                tracing::debug!(serial_connected, sensors, "Server status");
            }
            Ok(ServerMessage::ErrorResponse { error }) => {
                tracing::warn!(error = %error, "Server reported an error");
            }
            Err(e) => {
                tracing::warn!(line = %line, error = %e, "Dropped malformed server message");
            }
        }
    }
}

/// The consumer-facing communication service.
pub struct BridgeClient {
    shared: Arc<ClientShared>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeClient {
    /// Spawn the background connection and watchdog tasks and return
    /// immediately; the TCP link is established (and re-established) in the
    /// background with a flat retry interval.
    pub fn start(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(ClientShared::new(&config));
        let (stop_tx, stop_rx) = watch::channel(false);

        let watchdog = WatchdogManager::new(shared.registry.clone(), &config.watchdog);

        let tasks = vec![
            tokio::spawn(connection_loop(shared.clone(), config, stop_rx.clone())),
            tokio::spawn(watchdog.run(stop_rx)),
        ];

        Ok(Self {
            shared,
            stop: stop_tx,
            tasks,
        })
    }

    /// Set the callback invoked once per newly discovered sensor.
    ///
    /// The callback runs synchronously on the dispatch task and must be fast
    /// and non-blocking.
    pub fn set_discovery_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &[String], &str) + Send + Sync + 'static,
    {
        *self.shared.discovery_cb.write().unwrap() = Some(Arc::new(callback));
    }

    /// Register the data callback for one sensor, replacing any previous
    /// registration.
    ///
    /// The callback runs synchronously on the dispatch task and must be fast
    /// and non-blocking.
    pub fn register_data_callback<F>(&self, sensor_name: &str, callback: F)
    where
        F: Fn(&[f64]) + Send + Sync + 'static,
    {
        self.shared
            .data_cbs
            .write()
            .unwrap()
            .insert(sensor_name.to_string(), Arc::new(callback));
        tracing::debug!(sensor = %sensor_name, "Registered data callback");
    }

    /// Remove the data callback for one sensor.
    pub fn deregister_data_callback(&self, sensor_name: &str) {
        self.shared.data_cbs.write().unwrap().remove(sensor_name);
        tracing::debug!(sensor = %sensor_name, "Deregistered data callback");
    }

    /// Names of every sensor seen this session. Sensors survive
    /// disconnects; silence makes them unavailable, not absent.
    pub fn discovered_sensors(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    /// The most recent `n` inbound lines, oldest-first.
    pub fn buffer_lines(&self, n: usize) -> Vec<String> {
        self.shared.buffer.recent(n)
    }

    /// Whether a sensor is currently available per the client-side watchdog.
    pub fn is_sensor_available(&self, sensor_name: &str) -> bool {
        self.shared.registry.is_available(sensor_name)
    }

    /// Current state of the TCP link.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Snapshot of the connection and bridge health.
    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.shared.state() == ConnectionState::Connected,
            serial_connected: self.shared.serial_connected.load(Ordering::SeqCst),
            sensors: self.shared.server_sensors.load(Ordering::SeqCst),
            last_error: self.shared.last_error.lock().unwrap().clone(),
        }
    }

    /// Signal the background tasks to stop and wait for them with a bounded
    /// join; stragglers are aborted.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);

        for mut task in self.tasks {
            if tokio::time::timeout(Duration::from_secs(2), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }

        tracing::info!("Bridge client stopped");
    }
}

/// Connect, serve, and reconnect at a flat interval until stopped.
async fn connection_loop(
    shared: Arc<ClientShared>,
    config: ClientConfig,
    mut stop: watch::Receiver<bool>,
) {
    let addr = config.addr();

    loop {
        if *stop.borrow() {
            break;
        }

        shared.set_state(ConnectionState::Connecting);
        tracing::debug!(addr = %addr, "Connecting to bridge server");

        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                tracing::info!(addr = %addr, "Connected to bridge server");
                shared.set_state(ConnectionState::Connected);
                shared.clear_error();

                match serve_connection(&shared, &config, stream, &mut stop).await {
                    Ok(()) => {}
                    Err(e) => {
                        tracing::warn!(addr = %addr, error = %e, "Bridge connection lost");
                        shared.record_error(e.to_string());
                    }
                }
                shared.set_state(ConnectionState::Disconnected);
            }
            Err(e) => {
                tracing::debug!(addr = %addr, error = %e, "Connection attempt failed");
                shared.record_error(e.to_string());
                shared.set_state(ConnectionState::Disconnected);
            }
        }

        if *stop.borrow() {
            break;
        }

        // Flat reconnect interval, responsive to shutdown.
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay()) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    tracing::debug!("Connection loop stopped");
}

/// Serve one established connection: read pushes and responses, poll
/// `get_data` on the configured interval.
async fn serve_connection(
    shared: &ClientShared,
    config: &ClientConfig,
    stream: TcpStream,
    stop: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let mut poll = tokio::time::interval(config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut request_id: u64 = 0;

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(());
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => shared.dispatch_message(&line),
                Ok(None) => return Err(Error::connection("server closed the connection")),
                Err(e) => return Err(e.into()),
            },
            _ = poll.tick() => {
                request_id += 1;
                let request = encode_line(&ClientRequest::GetData { request_id })?;
                writer.write_all(request.as_bytes()).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn shared() -> ClientShared {
        ClientShared::new(&ClientConfig::default())
    }

    fn discovery(name: &str, pins: &[&str], payload: &str) -> EventEntry {
        EventEntry::Discovery {
            sensor_name: name.to_string(),
            pins: pins.iter().map(|p| p.to_string()).collect(),
            payload: payload.to_string(),
            timestamp: 1.0,
        }
    }

    fn data(name: &str, values: &[f64]) -> EventEntry {
        EventEntry::SensorData {
            sensor_name: name.to_string(),
            values: values.to_vec(),
            timestamp: 2.0,
        }
    }

    #[test]
    fn test_discovery_callback_fires_once() {
        let shared = shared();
        let (tx, rx) = mpsc::channel();

        *shared.discovery_cb.write().unwrap() = Some(Arc::new(move |name: &str, pins: &[String], payload: &str| {
            tx.send((name.to_string(), pins.to_vec(), payload.to_string()))
                .unwrap();
        }));

        shared.dispatch_entries(vec![
            discovery("temperature", &["A0"], "temp:25.5C"),
            discovery("temperature", &["A0"], "temp:25.7C"),
        ]);

        let (name, pins, payload) = rx.try_recv().unwrap();
        assert_eq!(name, "temperature");
        assert_eq!(pins, vec!["A0"]);
        assert_eq!(payload, "temp:25.5C");
        assert!(rx.try_recv().is_err(), "callback fired more than once");
    }

    #[test]
    fn test_data_callback_receives_values() {
        let shared = shared();
        let (tx, rx) = mpsc::channel();

        shared.data_cbs.write().unwrap().insert(
            "accelerometer".to_string(),
            Arc::new(move |values: &[f64]| tx.send(values.to_vec()).unwrap()),
        );

        shared.dispatch_entries(vec![
            data("accelerometer", &[0.03, -0.02, 9.80]),
            data("temperature", &[25.6]),
        ]);

        assert_eq!(rx.try_recv().unwrap(), vec![0.03, -0.02, 9.80]);
        // No callback registered for temperature.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_entries_land_in_buffer_and_registry() {
        let shared = shared();

        shared.dispatch_entries(vec![
            discovery("temperature", &["A0"], "temp:25.5C"),
            data("temperature", &[25.6]),
        ]);

        assert_eq!(
            shared.buffer.recent(10),
            vec!["*H*_temperature_A0_temp:25.5C", "temperature:25.6"]
        );
        assert!(shared.registry.is_available("temperature"));
        assert_eq!(
            shared.registry.get("temperature").unwrap().pins,
            vec!["A0"]
        );
    }

    #[test]
    fn test_data_entry_promotes_availability() {
        let shared = shared();
        shared.dispatch_entries(vec![discovery("temperature", &["A0"], "")]);

        std::thread::sleep(Duration::from_millis(10));
        shared.registry.demote_silent(Duration::ZERO);
        assert!(!shared.registry.is_available("temperature"));

        shared.dispatch_entries(vec![data("temperature", &[25.6])]);
        assert!(shared.registry.is_available("temperature"));
    }

    #[test]
    fn test_dispatch_message_handles_status_and_garbage() {
        let shared = shared();

        shared.dispatch_message(r#"{"type":"server_status","serial_connected":true,"sensors":4}"#);
        assert!(shared.serial_connected.load(Ordering::SeqCst));
        assert_eq!(shared.server_sensors.load(Ordering::SeqCst), 4);

        // Malformed and unknown messages are dropped without effect.
        shared.dispatch_message("not json at all");
        shared.dispatch_message(r#"{"type":"firmware_update"}"#);
        shared.dispatch_message("");
        assert!(shared.buffer.is_empty());
    }

    #[test]
    fn test_dispatch_message_routes_both_intake_paths() {
        let shared = shared();

        shared.dispatch_message(
            r#"{"type":"data_response","request_id":1,"data_count":1,"data":[
                {"type":"sensor_data","sensor_name":"a","values":[1.0],"timestamp":1.0}
            ]}"#,
        );
        shared.dispatch_message(
            r#"{"type":"periodic_update","data_count":1,"data":[
                {"type":"sensor_data","sensor_name":"a","values":[2.0],"timestamp":2.0}
            ]}"#,
        );

        // Both paths funneled into the same buffer, in order.
        assert_eq!(shared.buffer.recent(10), vec!["a:1", "a:2"]);
    }
}
