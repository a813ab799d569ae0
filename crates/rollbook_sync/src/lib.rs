//! # rollbook sync
//!
//! Pull/push synchronizer for the rollbook local store.
//!
//! This crate provides:
//! - The sync pass state machine
//!   (`Idle → Pulling → Applying → Pushing → Advancing → Idle`)
//! - The transport trait the application's network layer implements,
//!   plus an in-memory remote for tests
//! - Last-writer-wins conflict resolution (ties go to the remote)
//! - Per-pass reporting
//!
//! ## Key invariants
//!
//! - Pull is applied before push, per table, each in one transaction
//! - A table's cursor advances only after its pull and push both
//!   succeeded, inside the same store that holds the rows
//! - A failed or cancelled pass leaves cursors of incomplete table
//!   units untouched; the next pass rebuilds the same payload
//!   (at-least-once delivery, duplicate-tolerant transport)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod engine;
mod error;
mod report;
mod transport;

pub use config::SyncConfig;
pub use conflict::{resolve, Resolution};
pub use engine::{SyncState, Synchronizer};
pub use error::{SyncError, SyncResult, TransportError};
pub use report::{SyncReport, TableSyncReport};
pub use transport::{AcceptedWatermark, MemoryTransport, SyncTransport};
