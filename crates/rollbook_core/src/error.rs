//! Error types for the rollbook core.

use std::io;
use thiserror::Error;

use crate::record::Timestamp;
use crate::schema::SchemaVersion;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The single-writer lock could not be acquired within the
    /// configured timeout.
    #[error("write conflict: writer lock not acquired within {timeout_ms}ms")]
    WriteConflict {
        /// Lock acquisition timeout that elapsed.
        timeout_ms: u64,
    },

    /// I/O failure while persisting or loading the store file.
    ///
    /// Fatal: the caller must stop using the store rather than operate
    /// on data of unknown integrity.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// A value did not match its column definition.
    #[error("constraint violation on {table}.{column}: {message}")]
    ConstraintViolation {
        /// Table the write targeted.
        table: String,
        /// Column that failed validation.
        column: String,
        /// Description of the violation.
        message: String,
    },

    /// The named table is not part of the current schema.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the missing table.
        name: String,
    },

    /// No record with the given id exists in the table.
    #[error("record not found: {id} in table {table}")]
    RecordNotFound {
        /// Table that was searched.
        table: String,
        /// Record id that was not found.
        id: String,
    },

    /// Another process holds the store file lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The persisted snapshot could not be decoded.
    #[error("store corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The store handle has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a constraint violation error.
    pub fn constraint(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Creates a table-not-found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Returns true if the error indicates on-device damage that no
    /// retry can heal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Corrupted { .. } | StoreError::Closed
        )
    }
}

/// Errors raised by the schema registry and migration engine.
///
/// Every variant is fatal: the application shell must block data access
/// rather than run against a store of unknown schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The store was written by a newer schema than this build knows.
    /// There is no reverse-migration contract.
    #[error("downgrade: store is at version {store}, registry only knows {registry}")]
    Downgrade {
        /// Schema version persisted in the store.
        store: SchemaVersion,
        /// Current version of the registry.
        registry: SchemaVersion,
    },

    /// A migration step failed and was rolled back.
    #[error("migration step to version {version} failed: {reason}")]
    StepFailed {
        /// Target version of the failed step.
        version: SchemaVersion,
        /// Why the step failed.
        reason: String,
    },

    /// The registry itself is malformed (version gap, duplicate, or a
    /// step that does not apply to the schema its predecessors built).
    #[error("incompatible registry: {message}")]
    IncompatibleRegistry {
        /// Description of the problem.
        message: String,
    },

    /// Underlying store failure during a migration transaction.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    /// Creates a step-failed error.
    pub fn step_failed(version: SchemaVersion, reason: impl Into<String>) -> Self {
        Self::StepFailed {
            version,
            reason: reason.into(),
        }
    }

    /// Creates an incompatible-registry error.
    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::IncompatibleRegistry {
            message: message.into(),
        }
    }
}

/// Errors raised by the sync cursor ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An advance would move a cursor backwards without a forced reset.
    #[error("cursor regression on {table}: stored {stored}, attempted {attempted}")]
    Regression {
        /// Table whose cursor was targeted.
        table: String,
        /// Currently stored watermark.
        stored: Timestamp,
        /// Watermark the caller attempted to set.
        attempted: Timestamp,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(StoreError::Closed.is_fatal());
        assert!(StoreError::corrupted("bad header").is_fatal());
        assert!(!StoreError::WriteConflict { timeout_ms: 100 }.is_fatal());
        assert!(!StoreError::table_not_found("marks").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = StoreError::constraint("attendance", "status", "null not allowed");
        assert!(err.to_string().contains("attendance.status"));

        let err = MigrationError::Downgrade {
            store: 5,
            registry: 3,
        };
        assert!(err.to_string().contains("5"));
        assert!(err.to_string().contains("3"));

        let err = LedgerError::Regression {
            table: "marks".into(),
            stored: 100,
            attempted: 50,
        };
        assert!(err.to_string().contains("marks"));
    }
}
