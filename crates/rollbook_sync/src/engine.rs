//! The synchronizer state machine.
//!
//! A pass walks the store's tables in order and, per table, runs
//! `Pulling → Applying → Pushing → Advancing`. Any error sends the pass
//! to `Failed`: cursors of incomplete table units stay untouched, so
//! the next pass recomputes the same pull window and rebuilds the same
//! push payload from current cursors — an idempotent restart, relying
//! on the transport's duplicate tolerance for at-least-once delivery.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use rollbook_core::{LocalStore, Record, RecordId, Timestamp};

use crate::config::SyncConfig;
use crate::conflict::{self, Resolution};
use crate::error::{SyncError, SyncResult};
use crate::report::{SyncReport, TableSyncReport};
use crate::transport::SyncTransport;

/// Observable state of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass in flight.
    Idle,
    /// Requesting remote deltas for a table.
    Pulling,
    /// Resolving and applying remote deltas locally.
    Applying,
    /// Delivering local pending changes.
    Pushing,
    /// Committing the table's new cursor.
    Advancing,
    /// The last pass ended in an error; the next pass starts from Idle
    /// semantics either way.
    Failed,
}

impl SyncState {
    /// Returns true while a pass is doing work.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pulling | SyncState::Applying | SyncState::Pushing | SyncState::Advancing
        )
    }
}

/// Orchestrates pull, conflict resolution, push, and cursor advancement
/// against a [`LocalStore`] and a transport collaborator.
pub struct Synchronizer<T: SyncTransport> {
    store: Arc<LocalStore>,
    transport: Arc<T>,
    config: SyncConfig,
    state: RwLock<SyncState>,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
}

/// Clears the in-flight flag on every exit path of a pass.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: SyncTransport> Synchronizer<T> {
    /// Creates a synchronizer.
    pub fn new(store: Arc<LocalStore>, transport: T, config: SyncConfig) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
            config,
            state: RwLock::new(SyncState::Idle),
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the current observable state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Requests cooperative cancellation of the in-flight pass.
    ///
    /// Honored between table units, never mid-transaction. A cancelled
    /// pass reports like a failed one: cursors reflect only the table
    /// units that fully completed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one full sync pass over every table.
    ///
    /// Invoked by a connectivity-change collaborator or a periodic
    /// timer. If a pass is already in flight the call coalesces into a
    /// no-op report; the in-flight pass satisfies the request.
    pub fn run_sync_pass(&self) -> SyncResult<SyncReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync pass already in flight, coalescing");
            return Ok(SyncReport::coalesced());
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.cancelled.store(false, Ordering::SeqCst);
        self.set_state(SyncState::Idle);

        let start = Instant::now();
        let tables = self.store.table_names()?;
        let mut reports = Vec::with_capacity(tables.len());

        for table in &tables {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!(table, "sync pass cancelled");
                self.set_state(SyncState::Failed);
                return Err(SyncError::Cancelled);
            }

            match self.sync_table(table) {
                Ok(report) => {
                    debug!(
                        table,
                        pulled = report.pulled,
                        pushed = report.pushed,
                        cursor = report.cursor,
                        "table unit complete"
                    );
                    reports.push(report);
                }
                Err(e) => {
                    warn!(table, error = %e, fatal = e.is_fatal(), "sync pass failed");
                    self.set_state(SyncState::Failed);
                    return Err(e);
                }
            }
        }

        self.set_state(SyncState::Idle);
        let report = SyncReport {
            tables: reports,
            duration: start.elapsed(),
            coalesced: false,
        };
        info!(
            tables = report.tables.len(),
            pulled = report.total_pulled(),
            pushed = report.total_pushed(),
            "sync pass complete"
        );
        Ok(report)
    }

    /// Force-resets a table's cursor to epoch 0 so the next pass
    /// re-pulls the table's full history. Full-resync recovery only.
    pub fn reset_table(&self, table: &str) -> SyncResult<()> {
        self.store.write(|txn| {
            txn.advance_cursor(table, 0, true)?;
            Ok(())
        })
    }

    fn sync_table(&self, table: &str) -> SyncResult<TableSyncReport> {
        // Pull.
        self.set_state(SyncState::Pulling);
        let cursor = self.store.cursor(table)?;
        let remote = self.transport.pull_since(table, cursor)?;
        let remote_watermark = remote.iter().map(|r| r.updated_at).max().unwrap_or(cursor);

        // The pending set is computed against the pre-apply snapshot so
        // freshly applied remote rows are never echoed back.
        let pending = self.store.updated_since(table, cursor)?;

        // Apply, one transaction per table.
        self.set_state(SyncState::Applying);
        let overwritten = self.apply_remote(table, &remote)?;

        let batch: Vec<Record> = pending
            .into_iter()
            .filter(|r| !overwritten.contains(&r.id))
            .collect();

        // Push. The payload derives purely from cursor and rows, so a
        // failed pass resends it unchanged next time.
        self.set_state(SyncState::Pushing);
        let mut accepted: Timestamp = 0;
        if !batch.is_empty() {
            for chunk in batch.chunks(self.config.push_batch_size) {
                let watermark = self.transport.push_batch(table, chunk)?;
                accepted = accepted.max(watermark.0);
            }
        }

        // Advance, only now that pull and push both succeeded.
        self.set_state(SyncState::Advancing);
        let new_cursor = cursor.max(remote_watermark).max(accepted);
        if new_cursor > cursor {
            self.store.write(|txn| {
                txn.advance_cursor(table, new_cursor, false)?;
                Ok::<_, SyncError>(())
            })?;
        }

        Ok(TableSyncReport {
            table: table.to_string(),
            pulled: remote.len(),
            pushed: batch.len(),
            cursor: new_cursor,
        })
    }

    /// Applies remote records under last-writer-wins and returns the
    /// ids whose local pending edit lost.
    fn apply_remote(&self, table: &str, remote: &[Record]) -> SyncResult<BTreeSet<RecordId>> {
        if remote.is_empty() {
            return Ok(BTreeSet::new());
        }

        self.store.write(|txn| {
            let mut overwritten = BTreeSet::new();
            for incoming in remote {
                let local = txn.get(table, &incoming.id)?;
                match conflict::resolve(local.as_ref(), incoming) {
                    Resolution::RemoteWins => {
                        txn.put_replica(table, incoming.clone())?;
                        overwritten.insert(incoming.id.clone());
                    }
                    Resolution::LocalWins => {
                        debug!(table, id = %incoming.id, "local edit wins, remote ignored");
                    }
                }
            }
            Ok::<_, SyncError>(overwritten)
        })
    }
}

impl<T: SyncTransport> std::fmt::Debug for Synchronizer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
