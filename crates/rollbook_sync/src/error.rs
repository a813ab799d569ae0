//! Error types for the synchronizer.

use thiserror::Error;

use rollbook_core::{LedgerError, MigrationError, StoreError};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote authority could not be reached.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote authority rejected the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// The request did not complete within the transport's deadline.
    #[error("transport timed out")]
    Timeout,
}

/// Errors raised by a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure. Recoverable: the next pass retries from the
    /// same cursors; backoff policy belongs to the caller.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local store failure during the pass.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Cursor ledger failure during the pass.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Migration failure surfaced through the sync surface.
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    /// The pass was cancelled between table units.
    #[error("sync pass cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true for on-device integrity errors no retry can heal.
    ///
    /// Transport errors, lock-timeout write conflicts, cursor
    /// regressions, and cancellation are recoverable: the failed pass
    /// left cursors untouched for its incomplete tables, and the next
    /// pass recomputes everything from them.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Cancelled => false,
            SyncError::Ledger(LedgerError::Regression { .. }) => false,
            SyncError::Store(e) => e.is_fatal(),
            SyncError::Migration(_) => true,
        }
    }
}
