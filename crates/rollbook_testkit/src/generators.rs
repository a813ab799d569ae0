//! Property-based test generators using proptest.

use proptest::prelude::*;

use rollbook_core::{fields, Record, RecordId, Timestamp, Value};

/// Strategy for valid record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::string::string_regex("[a-z][a-z0-9]{0,11}")
        .expect("valid regex")
        .prop_map(RecordId::new)
}

/// Strategy for table-safe names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z_]{0,15}").expect("valid regex")
}

/// Strategy for timestamps within a small, collision-prone window.
/// Collisions matter: conflict resolution's tie break only shows up
/// when generated timestamps actually collide.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    0u64..1_000
}

/// Strategy for non-decreasing watermark sequences, as produced by any
/// real (non-forced) advance history.
pub fn watermark_run_strategy() -> impl Strategy<Value = Vec<Timestamp>> {
    prop::collection::vec(0u64..10_000, 0..32).prop_map(|mut steps| {
        steps.sort_unstable();
        steps
    })
}

/// Strategy for a `students` row with the given id, stamped at a
/// generated time.
pub fn student_record_strategy() -> impl Strategy<Value = Record> {
    (
        record_id_strategy(),
        prop::string::string_regex("[A-Z][a-z]{1,8}").expect("valid regex"),
        timestamp_strategy(),
    )
        .prop_map(|(id, name, at)| {
            let mut record = Record::new(id, fields([("name", Value::from(name))]));
            record.created_at = at;
            record.updated_at = at;
            record
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn watermark_runs_are_sorted(run in watermark_run_strategy()) {
            prop_assert!(run.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn student_records_are_stamped(record in student_record_strategy()) {
            prop_assert_eq!(record.created_at, record.updated_at);
            prop_assert!(record.field("name").is_some());
        }
    }
}
