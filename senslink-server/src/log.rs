//! Append-only event log with per-connection cursors.

use std::collections::VecDeque;
use std::sync::Mutex;

use senslink_common::protocol::EventEntry;

/// Bounded, append-only history of discovery and data events.
///
/// Entries carry implicit, monotonically increasing sequence numbers. Each
/// reader holds a cursor (the next sequence it has not yet seen) and fetches
/// snapshots with [`since`](EventLog::since); eviction from the front clamps
/// lagging cursors forward. Snapshots are taken under a short-held lock so
/// no network I/O ever happens while holding it.
#[derive(Debug)]
pub struct EventLog {
    inner: Mutex<LogInner>,
    capacity: usize,
}

#[derive(Debug)]
struct LogInner {
    entries: VecDeque<EventEntry>,
    start_seq: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity.max(1)),
                start_seq: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest when at capacity.
    pub fn append(&self, entry: EventEntry) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
            inner.start_seq += 1;
        }
        inner.entries.push_back(entry);
    }

    /// Sequence number one past the newest entry. This is the initial cursor
    /// for a new connection: it never sees entries predating it.
    pub fn end_seq(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.start_seq + inner.entries.len() as u64
    }

    /// All entries at or after `cursor`, plus the advanced cursor value.
    /// Cursors older than the retained window are clamped forward.
    pub fn since(&self, cursor: u64) -> (Vec<EventEntry>, u64) {
        let inner = self.inner.lock().unwrap();
        let end = inner.start_seq + inner.entries.len() as u64;
        let from = cursor.clamp(inner.start_seq, end);
        let offset = (from - inner.start_seq) as usize;
        let entries = inner.entries.iter().skip(offset).cloned().collect();
        (entries, end)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(name: &str, value: f64) -> EventEntry {
        EventEntry::SensorData {
            sensor_name: name.to_string(),
            values: vec![value],
            timestamp: 0.0,
        }
    }

    #[test]
    fn test_since_returns_only_new_entries() {
        let log = EventLog::new(16);
        log.append(data("a", 1.0));
        log.append(data("a", 2.0));

        let cursor = 0;
        let (entries, cursor) = log.since(cursor);
        assert_eq!(entries.len(), 2);

        // Nothing new yet.
        let (entries, cursor) = log.since(cursor);
        assert!(entries.is_empty());

        log.append(data("a", 3.0));
        let (entries, _) = log.since(cursor);
        assert_eq!(entries, vec![data("a", 3.0)]);
    }

    #[test]
    fn test_fresh_cursor_skips_history() {
        let log = EventLog::new(16);
        log.append(data("a", 1.0));
        log.append(data("a", 2.0));

        // A connection accepted now starts at the end of the log.
        let cursor = log.end_seq();
        let (entries, _) = log.since(cursor);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_independent_cursors() {
        let log = EventLog::new(16);
        log.append(data("a", 1.0));

        let (first_a, cursor_a) = log.since(0);
        log.append(data("a", 2.0));
        let (first_b, _cursor_b) = log.since(0);
        let (next_a, _) = log.since(cursor_a);

        assert_eq!(first_a.len(), 1);
        assert_eq!(first_b.len(), 2);
        assert_eq!(next_a, vec![data("a", 2.0)]);
    }

    #[test]
    fn test_eviction_clamps_lagging_cursor() {
        let log = EventLog::new(3);
        for i in 0..10 {
            log.append(data("a", i as f64));
        }

        assert_eq!(log.len(), 3);
        let (entries, cursor) = log.since(0);
        assert_eq!(
            entries,
            vec![data("a", 7.0), data("a", 8.0), data("a", 9.0)]
        );
        assert_eq!(cursor, 10);
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let log = EventLog::new(8);
        let (_, c1) = log.since(0);
        log.append(data("a", 1.0));
        let (_, c2) = log.since(c1);
        log.append(data("a", 2.0));
        let (_, c3) = log.since(c2);
        assert!(c1 <= c2 && c2 <= c3);
    }
}
