//! # rollbook core
//!
//! Embedded, versioned, local-first record store.
//!
//! This crate provides:
//! - A schema registry declaring every shipped schema version
//! - A forward-only migration engine with a fresh-install fast path
//! - A transactional table store with snapshot reads, a single-writer
//!   lock, store-stamped timestamps, and tombstone deletes
//! - A per-table sync cursor ledger persisted with the data it accounts
//!   for
//!
//! Synchronization against a remote authority lives in
//! `rollbook_sync`, built on the change tracking this crate provides:
//! the pending-change set of a table is derived, never stored — every
//! record whose `updated_at` is newer than the table's cursor.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod migration;
pub mod record;
pub mod schema;
pub mod store;
pub mod txn;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreOptions;
pub use db::Database;
pub use error::{
    LedgerError, LedgerResult, MigrationError, MigrationResult, StoreError, StoreResult,
};
pub use ledger::{AdvanceError, CursorLedger};
pub use migration::{MigrationEngine, MigrationOp, MigrationReport, MigrationStep};
pub use record::{fields, Record, RecordId, Timestamp};
pub use schema::{ColumnDefinition, SchemaRegistry, SchemaVersion, TableDefinition};
pub use store::LocalStore;
pub use txn::WriteTransaction;
pub use value::{ColumnType, Value};
