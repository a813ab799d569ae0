//! Sync cursor ledger.
//!
//! One monotonic watermark per table recording how much of that table's
//! history has been reconciled with the remote authority. Cursors are
//! persisted inside the store state, so an advance commits atomically
//! with the record mutations it accounts for — a crash can never leave
//! sync state ahead of (or behind) data state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{LedgerError, StoreError, StoreResult};
use crate::record::Timestamp;
use crate::store::LocalStore;

/// Read/advance view over the per-table sync cursors.
///
/// Driven by the synchronizer; advancement during a sync pass goes
/// through [`WriteTransaction::advance_cursor`] so it shares the
/// transaction that applied the corresponding records. The standalone
/// [`CursorLedger::advance`] runs its own transaction and exists for
/// recovery tooling and tests.
///
/// [`WriteTransaction::advance_cursor`]: crate::txn::WriteTransaction::advance_cursor
#[derive(Clone)]
pub struct CursorLedger {
    store: Arc<LocalStore>,
}

impl CursorLedger {
    /// Creates a ledger view over a store.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Returns the watermark of a table. Epoch 0 when the table has
    /// never been synced.
    pub fn get(&self, table: &str) -> StoreResult<Timestamp> {
        self.store.cursor(table)
    }

    /// Returns every persisted cursor.
    pub fn cursors(&self) -> StoreResult<BTreeMap<String, Timestamp>> {
        self.store.cursors()
    }

    /// Advances a table's cursor in its own transaction.
    ///
    /// Fails with [`LedgerError::Regression`] when the watermark would
    /// move backwards and `force` is false.
    pub fn advance(
        &self,
        table: &str,
        watermark: Timestamp,
        force: bool,
    ) -> Result<(), AdvanceError> {
        self.store.write(|txn| {
            txn.advance_cursor(table, watermark, force)?;
            Ok(())
        })
    }

    /// Force-resets a table's cursor to epoch 0 so the next sync pass
    /// re-pulls the table's full history.
    pub fn reset(&self, table: &str) -> Result<(), AdvanceError> {
        self.advance(table, 0, true)
    }
}

/// Error from a standalone cursor advance.
#[derive(Debug, thiserror::Error)]
pub enum AdvanceError {
    /// The underlying write transaction failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The advance was a regression.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreOptions;
    use crate::schema::{ColumnDefinition, TableDefinition};
    use crate::value::ColumnType;

    fn ledger() -> CursorLedger {
        let store = LocalStore::open_with_clock(
            StoreOptions::in_memory(),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        store
            .write(|txn| {
                txn.create_table(TableDefinition::new(
                    "marks",
                    vec![ColumnDefinition::required("score", ColumnType::Integer)],
                ))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        CursorLedger::new(Arc::new(store))
    }

    #[test]
    fn unsynced_table_is_at_epoch() {
        let ledger = ledger();
        assert_eq!(ledger.get("marks").unwrap(), 0);
    }

    #[test]
    fn advance_moves_forward_only() {
        let ledger = ledger();

        ledger.advance("marks", 100, false).unwrap();
        assert_eq!(ledger.get("marks").unwrap(), 100);

        // Equal watermark is not a regression.
        ledger.advance("marks", 100, false).unwrap();

        let err = ledger.advance("marks", 50, false).unwrap_err();
        assert!(matches!(
            err,
            AdvanceError::Ledger(LedgerError::Regression { .. })
        ));
        assert_eq!(ledger.get("marks").unwrap(), 100);
    }

    #[test]
    fn forced_reset_rewinds_to_epoch() {
        let ledger = ledger();
        ledger.advance("marks", 500, false).unwrap();

        ledger.reset("marks").unwrap();
        assert_eq!(ledger.get("marks").unwrap(), 0);
    }
}
