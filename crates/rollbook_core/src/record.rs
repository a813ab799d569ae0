//! Records and record identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::value::Value;

/// Milliseconds since the Unix epoch.
///
/// Timestamp 0 is the epoch watermark of a table that has never been
/// synced.
pub type Timestamp = u64;

/// Opaque record identity.
///
/// Callers may supply their own stable ids (e.g. the remote authority's
/// keys); locally created records use [`RecordId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id (UUIDv4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A row in a table.
///
/// `created_at` and `updated_at` are stamped exclusively by the store's
/// write transactions; callers only ever set `fields`. A deleted record
/// stays in the table as a tombstone until sync has propagated the
/// deletion and compaction removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity.
    pub id: RecordId,
    /// Column name to value.
    pub fields: BTreeMap<String, Value>,
    /// When the record was first inserted into this store.
    pub created_at: Timestamp,
    /// When the record was last written.
    pub updated_at: Timestamp,
    /// Soft-delete marker.
    pub deleted: bool,
}

impl Record {
    /// Creates a record shell with the given id and fields.
    ///
    /// Timestamps are zero until the record passes through a write
    /// transaction.
    pub fn new(id: RecordId, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            fields,
            created_at: 0,
            updated_at: 0,
            deleted: false,
        }
    }

    /// Returns the value of a field, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if this record is a live (non-tombstoned) row.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Convenience constructor for field maps.
///
/// ```
/// use rollbook_core::record::fields;
/// use rollbook_core::Value;
///
/// let f = fields([("name", Value::from("Alice")), ("grade", Value::from(7i64))]);
/// assert_eq!(f.len(), 2);
/// ```
pub fn fields<I, K>(pairs: I) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
