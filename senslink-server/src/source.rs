//! Line source variants and shared source health.
//!
//! Real hardware and the synthetic generator are interchangeable behind a
//! narrow capability surface: read one line with a timeout, attempt a
//! reconnect, report health. The variant is fixed at construction.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use senslink_common::error::Result;

use crate::mock::MockSource;
use crate::serial::SerialLineSource;

/// A line source, selected at construction.
pub enum LineSource {
    Serial(SerialLineSource),
    Mock(MockSource),
}

impl LineSource {
    /// Read the next complete line. `Ok(None)` means the read timed out
    /// without a full line; `Err` means the underlying device failed and a
    /// reconnect is in order.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            LineSource::Serial(source) => source.next_line().await,
            LineSource::Mock(source) => source.next_line().await,
        }
    }

    /// Attempt to re-establish the device connection. A no-op for the mock.
    pub async fn reconnect(&mut self) -> Result<()> {
        match self {
            LineSource::Serial(source) => source.reconnect().await,
            LineSource::Mock(_) => Ok(()),
        }
    }

    /// Whether the underlying device is currently connected.
    pub fn is_connected(&self) -> bool {
        match self {
            LineSource::Serial(source) => source.is_connected(),
            LineSource::Mock(source) => source.is_connected(),
        }
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            LineSource::Serial(source) => source.describe(),
            LineSource::Mock(source) => source.describe(),
        }
    }
}

/// Source health shared with the TCP server and the status logger.
///
/// A source disconnect never closes client sessions; it only flips
/// `connected` until recovery.
#[derive(Debug, Default)]
pub struct SourceHealth {
    connected: AtomicBool,
    lines_read: AtomicU64,
}

impl SourceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::SeqCst);
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::SeqCst)
    }
}
