//! Conflict resolution between local and remote edits.
//!
//! Policy: last-writer-wins by `updated_at`, ties broken in favor of
//! the remote value — the remote store is the authority of record. The
//! tie break means an exact-tie local edit is silently discarded; that
//! is an accepted data-loss edge case of the product policy, not a bug
//! to fix here.

use rollbook_core::Record;

/// Which side survives a conflicting write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote record is applied; the local row is overwritten.
    RemoteWins,
    /// The local record stands; the remote record is ignored.
    LocalWins,
}

/// Resolves an incoming remote record against the local row (if any).
///
/// Tombstones participate like any other write: a deletion carries its
/// own `updated_at` and wins or loses by the same rule.
pub fn resolve(local: Option<&Record>, remote: &Record) -> Resolution {
    match local {
        Some(local) if local.updated_at > remote.updated_at => Resolution::LocalWins,
        _ => Resolution::RemoteWins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_core::{fields, Record, RecordId, Value};

    fn record(updated_at: u64, name: &str) -> Record {
        let mut r = Record::new(RecordId::new("s1"), fields([("name", Value::from(name))]));
        r.updated_at = updated_at;
        r
    }

    #[test]
    fn newer_local_wins() {
        let local = record(200, "local");
        let remote = record(150, "remote");
        assert_eq!(resolve(Some(&local), &remote), Resolution::LocalWins);
    }

    #[test]
    fn newer_remote_wins() {
        let local = record(100, "local");
        let remote = record(150, "remote");
        assert_eq!(resolve(Some(&local), &remote), Resolution::RemoteWins);
    }

    #[test]
    fn exact_tie_goes_to_remote() {
        let local = record(100, "local");
        let remote = record(100, "remote");
        assert_eq!(resolve(Some(&local), &remote), Resolution::RemoteWins);
    }

    #[test]
    fn absent_local_always_loses() {
        let remote = record(1, "remote");
        assert_eq!(resolve(None, &remote), Resolution::RemoteWins);
    }

    #[test]
    fn deletion_participates_in_lww() {
        let mut local = record(200, "local");
        local.deleted = true;
        let remote = record(150, "remote");
        assert_eq!(resolve(Some(&local), &remote), Resolution::LocalWins);
    }
}
