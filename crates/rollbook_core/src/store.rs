//! The local store: durable, transactional, change-tracked tables.
//!
//! State is kept as a copy-on-write snapshot behind an `Arc`. Readers
//! clone the `Arc` and are never blocked by writers; they observe the
//! pre- or post-transaction state, never a partial one. Writers take a
//! global single-writer lock, mutate a working copy, and swap it in on
//! commit. When the store is file-backed, the snapshot is encoded as
//! CBOR and written atomically (temp file, fsync, rename) before the
//! swap, so a committed transaction is durable or absent as a whole.

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::StoreOptions;
use crate::error::{StoreError, StoreResult};
use crate::record::{Record, RecordId, Timestamp};
use crate::schema::{SchemaVersion, TableDefinition};
use crate::txn::WriteTransaction;

/// Rows and definition of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableData {
    pub(crate) definition: TableDefinition,
    pub(crate) rows: BTreeMap<RecordId, Record>,
}

impl TableData {
    pub(crate) fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            rows: BTreeMap::new(),
        }
    }
}

/// The complete persisted state: versioned tables, schema version, and
/// the sync cursor ledger. Everything commits together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub(crate) schema_version: SchemaVersion,
    pub(crate) tables: BTreeMap<String, TableData>,
    pub(crate) cursors: BTreeMap<String, Timestamp>,
}

struct FileBacking {
    path: PathBuf,
    // Held for the store's lifetime; dropping releases the advisory lock.
    _lock_file: File,
}

/// An embedded transactional table store.
pub struct LocalStore {
    state: RwLock<Arc<StoreState>>,
    writer: Mutex<()>,
    backing: Option<FileBacking>,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
    closed: AtomicBool,
}

impl LocalStore {
    /// Opens a store with the wall clock.
    pub fn open(options: StoreOptions) -> StoreResult<Self> {
        Self::open_with_clock(options, Arc::new(SystemClock))
    }

    /// Opens a store with an injected clock (tests).
    pub fn open_with_clock(options: StoreOptions, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let (state, backing) = match &options.path {
            Some(path) => {
                let lock_path = path.with_extension("lock");
                let lock_file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(false)
                    .open(&lock_path)?;
                lock_file
                    .try_lock_exclusive()
                    .map_err(|_| StoreError::Locked)?;

                let state = if path.exists() {
                    let file = File::open(path)?;
                    ciborium::de::from_reader(file)
                        .map_err(|e| StoreError::corrupted(e.to_string()))?
                } else {
                    StoreState::default()
                };

                (
                    state,
                    Some(FileBacking {
                        path: path.clone(),
                        _lock_file: lock_file,
                    }),
                )
            }
            None => (StoreState::default(), None),
        };

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            backing,
            clock,
            options,
            closed: AtomicBool::new(false),
        })
    }

    /// Opens an ephemeral in-memory store.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(StoreOptions::in_memory())
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Returns the committed snapshot.
    fn snapshot(&self) -> StoreResult<Arc<StoreState>> {
        self.check_open()?;
        Ok(Arc::clone(&self.state.read()))
    }

    /// Returns the schema version the store was last upgraded to.
    pub fn schema_version(&self) -> StoreResult<SchemaVersion> {
        Ok(self.snapshot()?.schema_version)
    }

    /// Returns the current table names, in definition order of the
    /// underlying map.
    pub fn table_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.snapshot()?.tables.keys().cloned().collect())
    }

    /// Returns the definition of a table.
    pub fn definition(&self, table: &str) -> StoreResult<TableDefinition> {
        let snapshot = self.snapshot()?;
        snapshot
            .tables
            .get(table)
            .map(|t| t.definition.clone())
            .ok_or_else(|| StoreError::table_not_found(table))
    }

    /// Reads one record (tombstones included).
    pub fn get(&self, table: &str, id: &RecordId) -> StoreResult<Option<Record>> {
        let snapshot = self.snapshot()?;
        let data = snapshot
            .tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(data.rows.get(id).cloned())
    }

    /// Returns the live rows of a table, ordered by id.
    pub fn scan(&self, table: &str) -> StoreResult<Vec<Record>> {
        let snapshot = self.snapshot()?;
        let data = snapshot
            .tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(data.rows.values().filter(|r| r.is_live()).cloned().collect())
    }

    /// Returns every row of a table, tombstones included.
    pub fn scan_all(&self, table: &str) -> StoreResult<Vec<Record>> {
        let snapshot = self.snapshot()?;
        let data = snapshot
            .tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        Ok(data.rows.values().cloned().collect())
    }

    /// Returns the pending-change set of a table: every record with
    /// `updated_at` strictly newer than the watermark, tombstones
    /// included, ascending by `updated_at` then id.
    pub fn updated_since(&self, table: &str, watermark: Timestamp) -> StoreResult<Vec<Record>> {
        let snapshot = self.snapshot()?;
        let data = snapshot
            .tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))?;
        let mut records: Vec<Record> = data
            .rows
            .values()
            .filter(|r| r.updated_at > watermark)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Returns the sync cursor of a table. Epoch 0 for a table that has
    /// never been synced.
    pub fn cursor(&self, table: &str) -> StoreResult<Timestamp> {
        Ok(self.snapshot()?.cursors.get(table).copied().unwrap_or(0))
    }

    /// Returns every persisted cursor.
    pub fn cursors(&self) -> StoreResult<BTreeMap<String, Timestamp>> {
        Ok(self.snapshot()?.cursors.clone())
    }

    /// Runs a closure inside an atomic write transaction.
    ///
    /// At most one write transaction is active at a time; acquisition
    /// is bounded by the configured timeout and fails with
    /// [`StoreError::WriteConflict`]. All staged writes commit together
    /// when the closure returns `Ok`; an error or panic discards them
    /// on every exit path.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.check_open()?;

        let guard = self
            .writer
            .try_lock_for(self.options.write_lock_timeout)
            .ok_or_else(|| StoreError::WriteConflict {
                timeout_ms: self.options.write_lock_timeout.as_millis() as u64,
            })?;

        // Working copy; readers keep seeing the committed snapshot.
        let mut working = (**self.state.read()).clone();
        let mut txn = WriteTransaction::new(&mut working, &*self.clock);
        let result = f(&mut txn)?;

        // Durability before visibility.
        self.persist(&working)?;

        *self.state.write() = Arc::new(working);
        drop(guard);
        Ok(result)
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(state, &mut encoded)
            .map_err(|e| StoreError::corrupted(e.to_string()))?;

        let tmp_path = backing.path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&encoded)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &backing.path)?;

        debug!(bytes = encoded.len(), path = %backing.path.display(), "snapshot persisted");
        Ok(())
    }

    /// Closes the store. Further calls fail with [`StoreError::Closed`];
    /// the file lock is released when the store is dropped.
    pub fn close(&self) -> StoreResult<()> {
        self.check_open()?;
        // Drain any in-flight writer before flipping the flag.
        let _guard = self.writer.lock();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalStore")
            .field("schema_version", &state.schema_version)
            .field("tables", &state.tables.len())
            .field("file_backed", &self.backing.is_some())
            .finish_non_exhaustive()
    }
}
