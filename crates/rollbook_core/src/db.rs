//! Database facade.
//!
//! The sanctioned surface for the surrounding application:
//! `open` → `initialize` → `query`/`mutate` → `close`. Handles are
//! explicit (no process-global store), so tests can run any number of
//! isolated instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::StoreOptions;
use crate::error::{MigrationResult, StoreError, StoreResult};
use crate::ledger::CursorLedger;
use crate::migration::{MigrationEngine, MigrationReport};
use crate::record::{Record, RecordId};
use crate::schema::SchemaRegistry;
use crate::store::LocalStore;
use crate::txn::WriteTransaction;
use crate::value::Value;

/// An opened rollbook database.
#[derive(Clone)]
pub struct Database {
    store: Arc<LocalStore>,
}

impl Database {
    /// Opens a database.
    pub fn open(options: StoreOptions) -> StoreResult<Self> {
        Ok(Self {
            store: Arc::new(LocalStore::open(options)?),
        })
    }

    /// Opens a database with an injected clock (tests).
    pub fn open_with_clock(options: StoreOptions, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Ok(Self {
            store: Arc::new(LocalStore::open_with_clock(options, clock)?),
        })
    }

    /// Opens an ephemeral in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(StoreOptions::in_memory())
    }

    /// Upgrades the store to the registry's current schema version.
    ///
    /// Call once at process start, before any read or write. Any
    /// returned error is fatal; the application shell must block data
    /// access rather than operate on a store of unknown integrity.
    pub fn initialize(&self, registry: &SchemaRegistry) -> MigrationResult<MigrationReport> {
        MigrationEngine::new(registry).upgrade(&self.store)
    }

    /// Returns the live records of a table matching a predicate.
    pub fn query<P>(&self, table: &str, predicate: P) -> StoreResult<Vec<Record>>
    where
        P: Fn(&Record) -> bool,
    {
        Ok(self
            .store
            .scan(table)?
            .into_iter()
            .filter(|r| predicate(r))
            .collect())
    }

    /// Looks up one record by id. Relational links are plain scalar
    /// fields; this is the lookup primitive for following them.
    pub fn get(&self, table: &str, id: &RecordId) -> StoreResult<Option<Record>> {
        Ok(self.store.get(table, id)?.filter(Record::is_live))
    }

    /// Runs a closure inside an atomic write transaction.
    pub fn mutate<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.store.write(f)
    }

    /// Inserts a record with a caller-supplied id.
    pub fn insert(
        &self,
        table: &str,
        id: RecordId,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<RecordId> {
        self.store.write(|txn| txn.insert(table, id, fields))
    }

    /// Replaces the fields of an existing record.
    pub fn update(
        &self,
        table: &str,
        id: &RecordId,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<()> {
        self.store.write(|txn| txn.update(table, id, fields))
    }

    /// Soft-deletes a record.
    pub fn delete(&self, table: &str, id: &RecordId) -> StoreResult<()> {
        self.store.write(|txn| txn.delete(table, id))
    }

    /// Returns a cursor ledger view.
    pub fn ledger(&self) -> CursorLedger {
        CursorLedger::new(Arc::clone(&self.store))
    }

    /// Returns the underlying store handle (synchronizer wiring).
    pub fn store(&self) -> Arc<LocalStore> {
        Arc::clone(&self.store)
    }

    /// Closes the database.
    pub fn close(&self) -> StoreResult<()> {
        self.store.close()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
