//! Sync pass reporting.

use std::time::Duration;

use rollbook_core::Timestamp;

/// Outcome of one table unit within a pass.
#[derive(Debug, Clone)]
pub struct TableSyncReport {
    /// Table name.
    pub table: String,
    /// Remote records pulled and resolved.
    pub pulled: usize,
    /// Local records pushed.
    pub pushed: usize,
    /// Cursor after the table unit completed.
    pub cursor: Timestamp,
}

/// Outcome of a sync pass.
///
/// The application's "offline / not yet synced" indicator is driven off
/// the last pass's report, never off individual record state.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Per-table outcomes, in the order they were processed.
    pub tables: Vec<TableSyncReport>,
    /// Wall time of the pass.
    pub duration: Duration,
    /// True if this call found a pass already in flight and did no work
    /// itself; the in-flight pass satisfies the request.
    pub coalesced: bool,
}

impl SyncReport {
    pub(crate) fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::default()
        }
    }

    /// Total records pulled across all tables.
    pub fn total_pulled(&self) -> usize {
        self.tables.iter().map(|t| t.pulled).sum()
    }

    /// Total records pushed across all tables.
    pub fn total_pushed(&self) -> usize {
        self.tables.iter().map(|t| t.pushed).sum()
    }
}
