//! Versioned schema registry.
//!
//! The registry declares every schema version the application has ever
//! shipped, as a chain of migration steps starting at version 1. Table
//! definitions per version are derived by folding the steps over an
//! empty schema, so the registry cannot drift from its own history:
//! a step that does not apply to the schema its predecessors built is
//! rejected at construction time. Silently renumbering a shipped
//! version is the single biggest correctness risk across a fleet of
//! devices at mixed versions, which is why a malformed chain is a fatal
//! [`MigrationError::IncompatibleRegistry`] rather than a warning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MigrationError, MigrationResult, StoreError, StoreResult};
use crate::migration::MigrationStep;
use crate::value::{ColumnType, Value};

/// Monotonically increasing schema version. Version 0 means "no store".
pub type SchemaVersion = u32;

/// A single column in a table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Declared value type.
    pub column_type: ColumnType,
    /// Whether null values are allowed.
    pub nullable: bool,
    /// Default value applied when a write omits the column.
    pub default: Option<Value>,
}

impl ColumnDefinition {
    /// Creates a non-nullable column without a default.
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
        }
    }

    /// Creates a nullable column without a default.
    pub fn nullable(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
        }
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// An ordered set of columns published under a table name.
///
/// Immutable once published in a schema version; evolved only through
/// migration steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Ordered column list.
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Creates a table definition.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Validates a field map against this definition and fills in
    /// defaults for omitted columns.
    ///
    /// Unknown fields, type mismatches, and missing non-nullable values
    /// without a default are [`StoreError::ConstraintViolation`].
    pub fn normalize_fields(
        &self,
        fields: &mut BTreeMap<String, Value>,
    ) -> StoreResult<()> {
        for name in fields.keys() {
            if self.column(name).is_none() {
                return Err(StoreError::constraint(
                    &self.name,
                    name.clone(),
                    "unknown column",
                ));
            }
        }

        for column in &self.columns {
            match fields.get(&column.name) {
                Some(Value::Null) | None => {
                    if let Some(default) = &column.default {
                        fields
                            .entry(column.name.clone())
                            .or_insert_with(|| default.clone());
                        // An explicit null on a defaulted column stays null
                        // only when the column is nullable.
                        if !column.nullable
                            && fields.get(&column.name).is_some_and(Value::is_null)
                        {
                            fields.insert(column.name.clone(), default.clone());
                        }
                    } else if column.nullable {
                        fields.entry(column.name.clone()).or_insert(Value::Null);
                    } else {
                        return Err(StoreError::constraint(
                            &self.name,
                            &column.name,
                            "null not allowed and no default declared",
                        ));
                    }
                }
                Some(value) => {
                    if !value.matches(column.column_type) {
                        return Err(StoreError::constraint(
                            &self.name,
                            &column.name,
                            format!("expected {}, got {:?}", column.column_type, value),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// The versioned table layout the application currently understands.
///
/// Append-only: a new release may only append a step; it never rewrites
/// or renumbers shipped history.
#[derive(Debug)]
pub struct SchemaRegistry {
    steps: BTreeMap<SchemaVersion, MigrationStep>,
    definitions: BTreeMap<SchemaVersion, Vec<TableDefinition>>,
    current: SchemaVersion,
}

impl SchemaRegistry {
    /// Builds a registry from the full step chain.
    ///
    /// Steps must target contiguous versions starting at 1. Each step
    /// is structurally applied to the schema built by its predecessors;
    /// any step that does not fit yields
    /// [`MigrationError::IncompatibleRegistry`].
    pub fn new(steps: Vec<MigrationStep>) -> MigrationResult<Self> {
        if steps.is_empty() {
            return Err(MigrationError::incompatible("registry has no versions"));
        }

        let mut by_version = BTreeMap::new();
        for step in steps {
            let version = step.target_version;
            if by_version.insert(version, step).is_some() {
                return Err(MigrationError::incompatible(format!(
                    "duplicate step for version {}",
                    version
                )));
            }
        }

        let mut definitions = BTreeMap::new();
        let mut tables: Vec<TableDefinition> = Vec::new();
        let mut expected: SchemaVersion = 1;

        for (version, step) in &by_version {
            if *version != expected {
                return Err(MigrationError::incompatible(format!(
                    "version gap: expected {}, found {}",
                    expected, version
                )));
            }
            for op in &step.ops {
                op.apply_to_definitions(&mut tables).map_err(|reason| {
                    MigrationError::incompatible(format!(
                        "step for version {} does not apply: {}",
                        version, reason
                    ))
                })?;
            }
            definitions.insert(*version, tables.clone());
            expected += 1;
        }

        let current = expected - 1;
        Ok(Self {
            steps: by_version,
            definitions,
            current,
        })
    }

    /// Returns the newest schema version this registry describes.
    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Returns the table definitions published at a version.
    pub fn definitions_at(&self, version: SchemaVersion) -> MigrationResult<&[TableDefinition]> {
        self.definitions
            .get(&version)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                MigrationError::incompatible(format!("unknown schema version {}", version))
            })
    }

    /// Returns the table definitions at the current version.
    pub fn current_definitions(&self) -> &[TableDefinition] {
        self.definitions
            .get(&self.current)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the step whose application produces `version`.
    pub fn step_for(&self, version: SchemaVersion) -> Option<&MigrationStep> {
        self.steps.get(&version)
    }

    /// Returns the names of the tables at the current version, in
    /// definition order.
    pub fn table_names(&self) -> Vec<String> {
        self.current_definitions()
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationOp;
    use crate::record::fields;

    fn students_v1() -> MigrationStep {
        MigrationStep::new(
            1,
            vec![MigrationOp::CreateTable(TableDefinition::new(
                "students",
                vec![
                    ColumnDefinition::required("name", ColumnType::Text),
                    ColumnDefinition::nullable("guardian", ColumnType::Text),
                ],
            ))],
        )
    }

    #[test]
    fn registry_builds_definitions_per_version() {
        let registry = SchemaRegistry::new(vec![
            students_v1(),
            MigrationStep::new(
                2,
                vec![MigrationOp::AddColumn {
                    table: "students".into(),
                    column: ColumnDefinition::nullable("grade", ColumnType::Integer),
                }],
            ),
        ])
        .unwrap();

        assert_eq!(registry.current_version(), 2);
        assert_eq!(registry.definitions_at(1).unwrap()[0].columns.len(), 2);
        assert_eq!(registry.definitions_at(2).unwrap()[0].columns.len(), 3);
        assert_eq!(registry.table_names(), vec!["students".to_string()]);
    }

    #[test]
    fn registry_rejects_version_gap() {
        let result = SchemaRegistry::new(vec![
            students_v1(),
            MigrationStep::new(3, vec![]),
        ]);
        assert!(matches!(
            result,
            Err(MigrationError::IncompatibleRegistry { .. })
        ));
    }

    #[test]
    fn registry_rejects_step_against_missing_table() {
        let result = SchemaRegistry::new(vec![MigrationStep::new(
            1,
            vec![MigrationOp::AddColumn {
                table: "ghosts".into(),
                column: ColumnDefinition::nullable("x", ColumnType::Text),
            }],
        )]);
        assert!(matches!(
            result,
            Err(MigrationError::IncompatibleRegistry { .. })
        ));
    }

    #[test]
    fn registry_rejects_empty_chain() {
        assert!(SchemaRegistry::new(Vec::new()).is_err());
    }

    #[test]
    fn normalize_fills_defaults_and_nulls() {
        let def = TableDefinition::new(
            "attendance",
            vec![
                ColumnDefinition::required("status", ColumnType::Text)
                    .with_default(Value::from("present")),
                ColumnDefinition::nullable("note", ColumnType::Text),
            ],
        );

        let mut f = fields::<[(&str, Value); 0], &str>([]);
        def.normalize_fields(&mut f).unwrap();
        assert_eq!(f.get("status").and_then(Value::as_text), Some("present"));
        assert!(f.get("note").unwrap().is_null());
    }

    #[test]
    fn normalize_rejects_unknown_column() {
        let def = TableDefinition::new(
            "students",
            vec![ColumnDefinition::required("name", ColumnType::Text)],
        );

        let mut f = fields([("name", Value::from("A")), ("extra", Value::from(1i64))]);
        let err = def.normalize_fields(&mut f).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));
    }

    #[test]
    fn normalize_rejects_type_mismatch() {
        let def = TableDefinition::new(
            "students",
            vec![ColumnDefinition::required("name", ColumnType::Text)],
        );

        let mut f = fields([("name", Value::from(1i64))]);
        assert!(def.normalize_fields(&mut f).is_err());
    }

    #[test]
    fn normalize_rejects_missing_required() {
        let def = TableDefinition::new(
            "students",
            vec![ColumnDefinition::required("name", ColumnType::Text)],
        );

        let mut f = fields::<[(&str, Value); 0], &str>([]);
        assert!(def.normalize_fields(&mut f).is_err());
    }
}
