//! Transport abstraction toward the remote authority.
//!
//! The synchronizer never talks to the network itself; it consumes this
//! trait, implemented by the application's API layer. The contract it
//! relies on:
//!
//! - `pull_since` is a pure read returning records in ascending
//!   `updated_at` order,
//! - `push_batch` tolerates receiving the same batch more than once
//!   (the synchronizer delivers at-least-once) and reports the maximum
//!   `updated_at` it actually committed.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use rollbook_core::{Record, RecordId, Timestamp};

use crate::error::TransportError;

/// Maximum `updated_at` the remote committed from a pushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedWatermark(pub Timestamp);

/// Request/response channel to the remote authority.
pub trait SyncTransport: Send + Sync {
    /// Returns remote records of `table` with `updated_at > since`,
    /// ascending by `updated_at`. Must be safe to call repeatedly with
    /// the same `since`.
    fn pull_since(&self, table: &str, since: Timestamp)
        -> Result<Vec<Record>, TransportError>;

    /// Delivers a batch of local records. Must be safe to receive the
    /// same batch twice without duplicating remote state.
    fn push_batch(
        &self,
        table: &str,
        records: &[Record],
    ) -> Result<AcceptedWatermark, TransportError>;
}

// Lets callers hand the synchronizer a shared handle and keep one for
// themselves (connectivity watchers, test assertions).
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    fn pull_since(
        &self,
        table: &str,
        since: Timestamp,
    ) -> Result<Vec<Record>, TransportError> {
        (**self).pull_since(table, since)
    }

    fn push_batch(
        &self,
        table: &str,
        records: &[Record],
    ) -> Result<AcceptedWatermark, TransportError> {
        (**self).push_batch(table, records)
    }
}

/// In-memory remote authority for tests.
///
/// Behaves like the real contract demands: pulls are pure reads in
/// ascending `updated_at` order, and pushes are idempotent
/// last-writer-wins upserts. Failures can be scripted per call.
#[derive(Default)]
pub struct MemoryTransport {
    tables: Mutex<BTreeMap<String, BTreeMap<RecordId, Record>>>,
    pull_failures: Mutex<VecDeque<TransportError>>,
    push_failures: Mutex<VecDeque<TransportError>>,
    push_calls: Mutex<u64>,
}

impl MemoryTransport {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the remote with a record, timestamps included.
    pub fn seed(&self, table: &str, record: Record) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Scripts the next pull to fail.
    pub fn fail_next_pull(&self, error: TransportError) {
        self.pull_failures.lock().push_back(error);
    }

    /// Scripts the next push to fail.
    pub fn fail_next_push(&self, error: TransportError) {
        self.push_failures.lock().push_back(error);
    }

    /// Returns a remote record, if present.
    pub fn remote_record(&self, table: &str, id: &RecordId) -> Option<Record> {
        self.tables.lock().get(table)?.get(id).cloned()
    }

    /// Returns the number of records the remote holds for a table.
    pub fn remote_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, BTreeMap::len)
    }

    /// Returns how many push calls the remote has served.
    pub fn push_calls(&self) -> u64 {
        *self.push_calls.lock()
    }
}

impl SyncTransport for MemoryTransport {
    fn pull_since(
        &self,
        table: &str,
        since: Timestamp,
    ) -> Result<Vec<Record>, TransportError> {
        if let Some(error) = self.pull_failures.lock().pop_front() {
            return Err(error);
        }

        let tables = self.tables.lock();
        let mut records: Vec<Record> = tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|r| r.updated_at > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    fn push_batch(
        &self,
        table: &str,
        records: &[Record],
    ) -> Result<AcceptedWatermark, TransportError> {
        if let Some(error) = self.push_failures.lock().pop_front() {
            return Err(error);
        }
        *self.push_calls.lock() += 1;

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        let mut watermark = 0;
        for record in records {
            let committed = match rows.get(&record.id) {
                // Last-writer-wins upsert; replaying an identical batch
                // rewrites identical state.
                Some(existing) => record.updated_at >= existing.updated_at,
                None => true,
            };
            if committed {
                rows.insert(record.id.clone(), record.clone());
                watermark = watermark.max(record.updated_at);
            }
        }
        Ok(AcceptedWatermark(watermark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_core::{fields, Value};

    fn record(id: &str, name: &str, updated_at: Timestamp) -> Record {
        let mut r = Record::new(RecordId::new(id), fields([("name", Value::from(name))]));
        r.created_at = updated_at;
        r.updated_at = updated_at;
        r
    }

    #[test]
    fn pull_is_ordered_and_strict() {
        let transport = MemoryTransport::new();
        transport.seed("students", record("s2", "B", 200));
        transport.seed("students", record("s1", "A", 100));
        transport.seed("students", record("s3", "C", 300));

        let pulled = transport.pull_since("students", 100).unwrap();
        let ids: Vec<&str> = pulled.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);

        // Pure read: identical on repeat.
        assert_eq!(transport.pull_since("students", 100).unwrap(), pulled);
    }

    #[test]
    fn push_is_idempotent() {
        let transport = MemoryTransport::new();
        let batch = vec![record("s1", "Alice", 100), record("s2", "Bo", 150)];

        let first = transport.push_batch("students", &batch).unwrap();
        assert_eq!(first, AcceptedWatermark(150));

        let again = transport.push_batch("students", &batch).unwrap();
        assert_eq!(again, AcceptedWatermark(150));
        assert_eq!(transport.remote_count("students"), 2);
    }

    #[test]
    fn push_does_not_clobber_newer_remote_state() {
        let transport = MemoryTransport::new();
        transport.seed("students", record("s1", "newer", 500));

        transport
            .push_batch("students", &[record("s1", "stale", 100)])
            .unwrap();

        let remote = transport
            .remote_record("students", &RecordId::new("s1"))
            .unwrap();
        assert_eq!(remote.field("name").and_then(Value::as_text), Some("newer"));
    }

    #[test]
    fn scripted_failures() {
        let transport = MemoryTransport::new();
        transport.fail_next_pull(TransportError::Timeout);

        assert!(transport.pull_since("students", 0).is_err());
        assert!(transport.pull_since("students", 0).is_ok());
    }
}
