//! Migration engine integration tests.
//!
//! The central property: upgrading a store through the step walk and
//! initializing a fresh store through the fast path must converge to
//! identical table definitions, for every version pair.

use std::sync::Arc;

use rollbook_core::{
    fields, ColumnDefinition, ColumnType, Database, ManualClock, MigrationError, MigrationOp,
    MigrationStep, RecordId, SchemaRegistry, StoreOptions, TableDefinition, Value,
};
use rollbook_testkit::{school_registry, school_steps};

fn registry_at(version: usize) -> SchemaRegistry {
    SchemaRegistry::new(school_steps().into_iter().take(version).collect())
        .expect("truncated school registry is well-formed")
}

fn db_with_clock(now: u64) -> Database {
    Database::open_with_clock(StoreOptions::in_memory(), Arc::new(ManualClock::new(now)))
        .unwrap()
}

#[test]
fn fast_path_and_step_walk_converge_for_every_version_pair() {
    let top = school_steps().len();

    for n in 1..=top {
        for m in (n + 1)..=top {
            // Step walk: fresh at N, then upgrade to M.
            let walked = db_with_clock(0);
            let report = walked.initialize(&registry_at(n)).unwrap();
            assert!(report.fast_path);
            let report = walked.initialize(&registry_at(m)).unwrap();
            assert!(!report.fast_path);
            assert_eq!(report.applied, ((n as u32 + 1)..=(m as u32)).collect::<Vec<_>>());

            // Fast path: fresh directly at M.
            let fresh = db_with_clock(0);
            fresh.initialize(&registry_at(m)).unwrap();

            let walked_store = walked.store();
            let fresh_store = fresh.store();
            assert_eq!(
                walked_store.table_names().unwrap(),
                fresh_store.table_names().unwrap(),
                "table set differs for ({n}, {m})"
            );
            for table in walked_store.table_names().unwrap() {
                assert_eq!(
                    walked_store.definition(&table).unwrap(),
                    fresh_store.definition(&table).unwrap(),
                    "definition of {table} differs for ({n}, {m})"
                );
            }
            assert_eq!(
                walked_store.schema_version().unwrap(),
                fresh_store.schema_version().unwrap()
            );
        }
    }
}

#[test]
fn fresh_install_at_version_three() {
    let db = db_with_clock(0);
    let report = db.initialize(&school_registry()).unwrap();

    assert!(report.fast_path);
    assert_eq!(report.from_version, 0);
    assert_eq!(report.to_version, 3);

    let store = db.store();
    assert_eq!(store.schema_version().unwrap(), 3);
    for table in ["students", "attendance", "marks"] {
        assert!(store.scan_all(table).unwrap().is_empty());
        assert_eq!(store.cursor(table).unwrap(), 0);
    }
    assert_eq!(
        store.definition("students").unwrap(),
        school_registry().current_definitions()[0]
    );
}

#[test]
fn step_walk_preserves_existing_rows() {
    let db = db_with_clock(50);
    db.initialize(&registry_at(1)).unwrap();
    db.insert(
        "students",
        RecordId::new("s1"),
        fields([("name", Value::from("Alice"))]),
    )
    .unwrap();

    db.initialize(&school_registry()).unwrap();

    let record = db.get("students", &RecordId::new("s1")).unwrap().unwrap();
    assert_eq!(record.field("name").and_then(Value::as_text), Some("Alice"));
    // Version 3 added a nullable homeroom column; existing rows got null.
    assert!(record.field("homeroom").unwrap().is_null());
    assert_eq!(record.created_at, 50);
}

#[test]
fn downgrade_is_fatal() {
    let db = db_with_clock(0);
    db.initialize(&school_registry()).unwrap();

    let err = db.initialize(&registry_at(1)).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Downgrade {
            store: 3,
            registry: 1
        }
    ));

    // The store is untouched.
    assert_eq!(db.store().schema_version().unwrap(), 3);
}

#[test]
fn failed_step_rolls_back_to_prior_version() {
    // A store migrated by one registry, upgraded with a registry whose
    // later steps do not match the store's actual shape. The registry
    // itself is internally consistent, so the mismatch only surfaces
    // when the step runs against the live store.
    let db = db_with_clock(0);
    db.initialize(&registry_at(1)).unwrap();

    let diverged = SchemaRegistry::new(vec![
        MigrationStep::new(
            1,
            vec![MigrationOp::CreateTable(TableDefinition::new(
                "rooms",
                vec![ColumnDefinition::required("label", ColumnType::Text)],
            ))],
        ),
        MigrationStep::new(
            2,
            vec![MigrationOp::AddColumn {
                table: "rooms".into(),
                column: ColumnDefinition::nullable("floor", ColumnType::Integer),
            }],
        ),
    ])
    .unwrap();

    let err = db.initialize(&diverged).unwrap_err();
    assert!(matches!(err, MigrationError::StepFailed { version: 2, .. }));

    // Rolled back: still at version 1, no partial shape change.
    let store = db.store();
    assert_eq!(store.schema_version().unwrap(), 1);
    assert!(store.definition("rooms").is_err());
}

#[test]
fn column_lifecycle_ops_rewrite_rows() {
    let registry_v1 = SchemaRegistry::new(vec![MigrationStep::new(
        1,
        vec![MigrationOp::CreateTable(TableDefinition::new(
            "marks",
            vec![
                ColumnDefinition::required("subject", ColumnType::Text),
                ColumnDefinition::nullable("points", ColumnType::Integer),
            ],
        ))],
    )])
    .unwrap();

    let db = db_with_clock(10);
    db.initialize(&registry_v1).unwrap();
    db.insert(
        "marks",
        RecordId::new("m1"),
        fields([("subject", Value::from("maths"))]),
    )
    .unwrap();

    let mut steps = vec![registry_v1.step_for(1).unwrap().clone()];
    steps.push(MigrationStep::new(
        2,
        vec![
            MigrationOp::RenameColumn {
                table: "marks".into(),
                from: "points".into(),
                to: "score".into(),
            },
            MigrationOp::Backfill {
                table: "marks".into(),
                column: "score".into(),
                value: Value::from(0i64),
            },
            MigrationOp::AddColumn {
                table: "marks".into(),
                column: ColumnDefinition::required("term", ColumnType::Integer)
                    .with_default(Value::from(1i64)),
            },
        ],
    ));
    let registry_v2 = SchemaRegistry::new(steps).unwrap();

    db.initialize(&registry_v2).unwrap();

    let record = db.get("marks", &RecordId::new("m1")).unwrap().unwrap();
    assert_eq!(record.field("points"), None);
    assert_eq!(record.field("score").and_then(Value::as_integer), Some(0));
    assert_eq!(record.field("term").and_then(Value::as_integer), Some(1));
}

#[test]
fn reapplying_a_reached_step_is_a_noop() {
    let db = db_with_clock(0);
    db.initialize(&school_registry()).unwrap();

    let report = db.initialize(&school_registry()).unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.from_version, report.to_version);
}
