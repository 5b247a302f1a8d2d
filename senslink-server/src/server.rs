//! TCP bridge server.
//!
//! Multiplexes one line source across N concurrent client connections over
//! newline-delimited JSON. Each connection owns a cursor into the shared
//! event log, initialized at accept time so a fresh client never sees
//! entries predating its connection. The cursor advances on both
//! `data_response` and `periodic_update`, so every entry reaches a given
//! connection exactly once, in parser order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use senslink_common::error::Result;
use senslink_common::protocol::{ClientRequest, ServerMessage, encode_line};

use crate::bridge::BridgeState;

/// Accept connections until the stop signal flips.
pub async fn run(
    listener: TcpListener,
    state: Arc<BridgeState>,
    push_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    spawn_connection(stream, addr, state.clone(), push_interval, stop.clone());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed");
                }
            }
        }
    }

    tracing::info!("Bridge server stopped");
}

fn spawn_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<BridgeState>,
    push_interval: Duration,
    stop: watch::Receiver<bool>,
) {
    tracing::info!(%addr, "Client connected");

    tokio::spawn(async move {
        state.client_connected();
        if let Err(e) = handle_connection(stream, state.clone(), push_interval, stop).await {
            tracing::debug!(%addr, error = %e, "Connection ended with error");
        }
        state.client_disconnected();
        tracing::info!(%addr, "Client disconnected");
    });
}

/// Serve one client: inbound requests and periodic pushes share the
/// connection's cursor.
async fn handle_connection(
    stream: TcpStream,
    state: Arc<BridgeState>,
    push_interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // New connections start at the end of the log.
    let mut cursor = state.events.end_seq();

    let mut ticker = tokio::time::interval(push_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let reply = process_request(&line, &mut cursor, &state);
                    send(&mut writer, &reply).await?;
                }
                Ok(None) => break,
                Err(e) => return Err(e.into()),
            },
            _ = ticker.tick() => {
                let (entries, next) = state.events.since(cursor);
                cursor = next;

                if !entries.is_empty() {
                    send(&mut writer, &ServerMessage::PeriodicUpdate {
                        data_count: entries.len(),
                        data: entries,
                    })
                    .await?;
                }

                send(&mut writer, &ServerMessage::ServerStatus {
                    serial_connected: state.health.is_connected(),
                    sensors: state.registry.len(),
                })
                .await?;
            }
        }
    }

    Ok(())
}

/// Decode one request line and build the reply. Malformed JSON and unknown
/// tags get an error reply; the connection stays open either way.
fn process_request(line: &str, cursor: &mut u64, state: &BridgeState) -> ServerMessage {
    match serde_json::from_str::<ClientRequest>(line) {
        Ok(ClientRequest::GetData { request_id }) => {
            let (entries, next) = state.events.since(*cursor);
            *cursor = next;
            tracing::debug!(request_id, count = entries.len(), "Serving get_data");
            ServerMessage::DataResponse {
                request_id,
                data_count: entries.len(),
                data: entries,
            }
        }
        Err(e) => {
            tracing::warn!(line = %line, error = %e, "Malformed client request");
            ServerMessage::ErrorResponse {
                error: format!("Invalid request: {e}"),
            }
        }
    }
}

async fn send(writer: &mut OwnedWriteHalf, msg: &ServerMessage) -> Result<()> {
    let line = encode_line(msg)?;
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use senslink_common::protocol::EventEntry;

    fn state_with_entries(n: usize) -> BridgeState {
        let state = BridgeState::new(&ServerConfig::default());
        for i in 0..n {
            state.events.append(EventEntry::SensorData {
                sensor_name: "temperature".to_string(),
                values: vec![i as f64],
                timestamp: i as f64,
            });
        }
        state
    }

    #[test]
    fn test_get_data_advances_cursor() {
        let state = state_with_entries(3);
        let mut cursor = 0;

        let reply = process_request(
            r#"{"type":"get_data","request_id":1}"#,
            &mut cursor,
            &state,
        );
        match reply {
            ServerMessage::DataResponse {
                request_id,
                data_count,
                data,
            } => {
                assert_eq!(request_id, 1);
                assert_eq!(data_count, 3);
                assert_eq!(data.len(), 3);
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        // Second call returns only entries newer than the prior cursor.
        let reply = process_request(
            r#"{"type":"get_data","request_id":2}"#,
            &mut cursor,
            &state,
        );
        match reply {
            ServerMessage::DataResponse { data_count, .. } => assert_eq!(data_count, 0),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_gets_error_reply() {
        let state = state_with_entries(1);
        let mut cursor = 0;

        let reply = process_request("{not json", &mut cursor, &state);
        assert!(matches!(reply, ServerMessage::ErrorResponse { .. }));
        // The cursor is untouched by a bad request.
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_unknown_request_tag_gets_error_reply() {
        let state = state_with_entries(0);
        let mut cursor = 0;

        let reply = process_request(
            r#"{"type":"write_pin","request_id":9}"#,
            &mut cursor,
            &state,
        );
        assert!(matches!(reply, ServerMessage::ErrorResponse { .. }));
    }
}
