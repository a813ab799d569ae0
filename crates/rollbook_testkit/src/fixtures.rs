//! Shared fixtures: school-domain registries and pre-wired databases.

use std::sync::Arc;

use rollbook_core::{
    ColumnDefinition, ColumnType, Database, ManualClock, MigrationOp, MigrationStep,
    SchemaRegistry, StoreOptions, TableDefinition, Value,
};

/// The `students` table as first shipped (version 1).
pub fn students_table() -> TableDefinition {
    TableDefinition::new(
        "students",
        vec![
            ColumnDefinition::required("name", ColumnType::Text),
            ColumnDefinition::nullable("guardian", ColumnType::Text),
        ],
    )
}

/// The `attendance` table added in version 2.
pub fn attendance_table() -> TableDefinition {
    TableDefinition::new(
        "attendance",
        vec![
            ColumnDefinition::required("student_id", ColumnType::Text),
            ColumnDefinition::required("status", ColumnType::Text)
                .with_default(Value::from("present")),
            ColumnDefinition::nullable("note", ColumnType::Text),
        ],
    )
}

/// The full three-version school registry:
///
/// 1. `students`
/// 2. adds `attendance`
/// 3. adds `marks` and a `homeroom` column on `students`
pub fn school_registry() -> SchemaRegistry {
    SchemaRegistry::new(school_steps()).expect("school registry is well-formed")
}

/// The raw step chain behind [`school_registry`], for tests that build
/// partial registries.
pub fn school_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(1, vec![MigrationOp::CreateTable(students_table())]),
        MigrationStep::new(2, vec![MigrationOp::CreateTable(attendance_table())]),
        MigrationStep::new(
            3,
            vec![
                MigrationOp::CreateTable(TableDefinition::new(
                    "marks",
                    vec![
                        ColumnDefinition::required("student_id", ColumnType::Text),
                        ColumnDefinition::required("subject", ColumnType::Text),
                        ColumnDefinition::required("score", ColumnType::Integer),
                    ],
                )),
                MigrationOp::AddColumn {
                    table: "students".into(),
                    column: ColumnDefinition::nullable("homeroom", ColumnType::Text),
                },
            ],
        ),
    ]
}

/// An initialized in-memory database with a manual clock, ready for
/// deterministic timestamp assertions.
pub fn school_db_at(now: u64) -> (Database, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let db = Database::open_with_clock(StoreOptions::in_memory(), Arc::clone(&clock) as _)
        .expect("open in-memory database");
    db.initialize(&school_registry())
        .expect("initialize school schema");
    (db, clock)
}

/// Initializes `tracing` output for a test binary. Safe to call from
/// multiple tests; only the first call installs the subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_registry_is_three_versions() {
        let registry = school_registry();
        assert_eq!(registry.current_version(), 3);
        assert_eq!(
            registry.table_names(),
            vec![
                "students".to_string(),
                "attendance".to_string(),
                "marks".to_string()
            ]
        );
    }

    #[test]
    fn school_db_starts_clean() {
        let (db, _) = school_db_at(0);
        assert!(db.query("students", |_| true).unwrap().is_empty());
        assert_eq!(db.ledger().get("students").unwrap(), 0);
    }
}
