//! Schema migration engine.
//!
//! Migrations are metadata-driven and forward-only: each step carries
//! the operations that take the schema from version N to N+1, and every
//! step runs inside one atomic write transaction. A failed step rolls
//! back completely, leaving the store at the last fully applied
//! version. There is no reverse contract: a store written by a newer
//! schema than this build knows is a fatal
//! [`MigrationError::Downgrade`].
//!
//! A fresh store (version 0) skips the step walk and applies the
//! current table definitions directly. Both paths must converge to the
//! identical schema; the registry derives per-version definitions from
//! the same step chain, and the property is also covered by tests.

use tracing::{debug, info};

use crate::error::{MigrationError, MigrationResult};
use crate::schema::{ColumnDefinition, SchemaRegistry, SchemaVersion, TableDefinition};
use crate::store::LocalStore;
use crate::value::Value;

/// One structural operation inside a migration step.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOp {
    /// Publishes a new table.
    CreateTable(TableDefinition),
    /// Removes a table and its rows.
    DropTable {
        /// Name of the table to drop.
        name: String,
    },
    /// Appends a column. Non-nullable columns must declare a default so
    /// existing rows can be filled.
    AddColumn {
        /// Table to alter.
        table: String,
        /// Column to append.
        column: ColumnDefinition,
    },
    /// Renames a column, carrying row values over.
    RenameColumn {
        /// Table to alter.
        table: String,
        /// Current column name.
        from: String,
        /// New column name.
        to: String,
    },
    /// Removes a column and its row values.
    DropColumn {
        /// Table to alter.
        table: String,
        /// Column to remove.
        column: String,
    },
    /// Sets a value on every row where the column is currently null.
    Backfill {
        /// Table to rewrite.
        table: String,
        /// Column to fill.
        column: String,
        /// Value written into null cells.
        value: Value,
    },
}

impl MigrationOp {
    /// Applies this operation to a set of table definitions.
    ///
    /// Pure shape transformation used by the registry to derive (and
    /// validate) per-version definitions. Row rewrites happen inside
    /// write transactions when the engine runs the step.
    pub fn apply_to_definitions(&self, tables: &mut Vec<TableDefinition>) -> Result<(), String> {
        fn find<'a>(
            tables: &'a mut Vec<TableDefinition>,
            name: &str,
        ) -> Result<&'a mut TableDefinition, String> {
            tables
                .iter_mut()
                .find(|t| t.name == name)
                .ok_or_else(|| format!("table {} does not exist", name))
        }

        match self {
            MigrationOp::CreateTable(def) => {
                if tables.iter().any(|t| t.name == def.name) {
                    return Err(format!("table {} already exists", def.name));
                }
                let mut seen = std::collections::BTreeSet::new();
                for column in &def.columns {
                    if !seen.insert(&column.name) {
                        return Err(format!(
                            "table {} declares column {} twice",
                            def.name, column.name
                        ));
                    }
                }
                tables.push(def.clone());
            }
            MigrationOp::DropTable { name } => {
                let before = tables.len();
                tables.retain(|t| &t.name != name);
                if tables.len() == before {
                    return Err(format!("table {} does not exist", name));
                }
            }
            MigrationOp::AddColumn { table, column } => {
                if !column.nullable && column.default.is_none() {
                    return Err(format!(
                        "column {}.{} is non-nullable and has no default",
                        table, column.name
                    ));
                }
                let def = find(tables, table)?;
                if def.column(&column.name).is_some() {
                    return Err(format!("column {}.{} already exists", table, column.name));
                }
                def.columns.push(column.clone());
            }
            MigrationOp::RenameColumn { table, from, to } => {
                let def = find(tables, table)?;
                if def.column(to).is_some() {
                    return Err(format!("column {}.{} already exists", table, to));
                }
                let column = def
                    .columns
                    .iter_mut()
                    .find(|c| &c.name == from)
                    .ok_or_else(|| format!("column {}.{} does not exist", table, from))?;
                column.name = to.clone();
            }
            MigrationOp::DropColumn { table, column } => {
                let def = find(tables, table)?;
                let before = def.columns.len();
                def.columns.retain(|c| &c.name != column);
                if def.columns.len() == before {
                    return Err(format!("column {}.{} does not exist", table, column));
                }
            }
            MigrationOp::Backfill {
                table,
                column,
                value,
            } => {
                let def = find(tables, table)?;
                let col = def
                    .column(column)
                    .ok_or_else(|| format!("column {}.{} does not exist", table, column))?;
                if !value.matches(col.column_type) {
                    return Err(format!(
                        "backfill value for {}.{} does not match type {}",
                        table, column, col.column_type
                    ));
                }
            }
        }

        Ok(())
    }
}

/// The operations that take the schema from version N to N+1.
///
/// `target_version` is N+1. Re-applying a step whose target version the
/// store has already reached is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    /// Version this step upgrades the store to.
    pub target_version: SchemaVersion,
    /// Ordered operations.
    pub ops: Vec<MigrationOp>,
}

impl MigrationStep {
    /// Creates a migration step.
    pub fn new(target_version: SchemaVersion, ops: Vec<MigrationOp>) -> Self {
        Self {
            target_version,
            ops,
        }
    }
}

/// Result of one upgrade run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Version the store was at before the run.
    pub from_version: SchemaVersion,
    /// Version the store is at after the run.
    pub to_version: SchemaVersion,
    /// Versions applied during this run, in order.
    pub applied: Vec<SchemaVersion>,
    /// True if the fresh-install fast path was taken.
    pub fast_path: bool,
}

impl MigrationReport {
    fn noop(version: SchemaVersion) -> Self {
        Self {
            from_version: version,
            to_version: version,
            applied: Vec::new(),
            fast_path: false,
        }
    }
}

/// Walks a store from its persisted schema version to the registry's
/// current version.
pub struct MigrationEngine<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> MigrationEngine<'a> {
    /// Creates an engine bound to a registry.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Upgrades the store to the registry's current version.
    ///
    /// Each step runs in its own atomic write transaction; a failure
    /// leaves the store at the last fully applied version.
    pub fn upgrade(&self, store: &LocalStore) -> MigrationResult<MigrationReport> {
        let from = store.schema_version()?;
        let to = self.registry.current_version();

        if from > to {
            return Err(MigrationError::Downgrade {
                store: from,
                registry: to,
            });
        }
        if from == to {
            debug!(version = from, "schema already current");
            return Ok(MigrationReport::noop(from));
        }

        if from == 0 {
            return self.fresh_install(store, to);
        }

        let mut applied = Vec::new();
        for version in (from + 1)..=to {
            let step = self.registry.step_for(version).ok_or_else(|| {
                MigrationError::incompatible(format!("no step targets version {}", version))
            })?;

            store
                .write(|txn| {
                    // Idempotent-safe: a step whose target the store has
                    // already reached is skipped.
                    if txn.schema_version() >= version {
                        return Ok(());
                    }
                    for op in &step.ops {
                        txn.apply_migration_op(op)?;
                    }
                    txn.set_schema_version(version);
                    Ok(())
                })
                .map_err(|e: MigrationError| match e {
                    MigrationError::Store(inner) if inner.is_fatal() => {
                        MigrationError::Store(inner)
                    }
                    other => MigrationError::step_failed(version, other.to_string()),
                })?;

            debug!(version, ops = step.ops.len(), "applied migration step");
            applied.push(version);
        }

        info!(from, to, "store upgraded");
        Ok(MigrationReport {
            from_version: from,
            to_version: to,
            applied,
            fast_path: false,
        })
    }

    /// Fresh-install fast path: applies the current definitions in one
    /// transaction instead of walking every historical step.
    fn fresh_install(
        &self,
        store: &LocalStore,
        to: SchemaVersion,
    ) -> MigrationResult<MigrationReport> {
        let definitions = self.registry.current_definitions().to_vec();

        store.write(|txn| {
            for def in &definitions {
                txn.create_table(def.clone())?;
            }
            txn.set_schema_version(to);
            Ok::<_, MigrationError>(())
        })?;

        info!(version = to, tables = definitions.len(), "fresh store initialized");
        Ok(MigrationReport {
            from_version: 0,
            to_version: to,
            applied: vec![to],
            fast_path: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDefinition;
    use crate::value::ColumnType;

    fn def(name: &str) -> TableDefinition {
        TableDefinition::new(
            name,
            vec![ColumnDefinition::required("name", ColumnType::Text)],
        )
    }

    #[test]
    fn create_and_drop_table_shape() {
        let mut tables = Vec::new();
        MigrationOp::CreateTable(def("students"))
            .apply_to_definitions(&mut tables)
            .unwrap();
        assert_eq!(tables.len(), 1);

        // Duplicate create is an error.
        assert!(MigrationOp::CreateTable(def("students"))
            .apply_to_definitions(&mut tables)
            .is_err());

        MigrationOp::DropTable {
            name: "students".into(),
        }
        .apply_to_definitions(&mut tables)
        .unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn add_column_requires_default_when_non_nullable() {
        let mut tables = vec![def("students")];
        let op = MigrationOp::AddColumn {
            table: "students".into(),
            column: ColumnDefinition::required("grade", ColumnType::Integer),
        };
        assert!(op.apply_to_definitions(&mut tables).is_err());

        let op = MigrationOp::AddColumn {
            table: "students".into(),
            column: ColumnDefinition::required("grade", ColumnType::Integer)
                .with_default(Value::from(0i64)),
        };
        op.apply_to_definitions(&mut tables).unwrap();
        assert!(tables[0].column("grade").is_some());
    }

    #[test]
    fn rename_column_shape() {
        let mut tables = vec![def("students")];
        MigrationOp::RenameColumn {
            table: "students".into(),
            from: "name".into(),
            to: "full_name".into(),
        }
        .apply_to_definitions(&mut tables)
        .unwrap();

        assert!(tables[0].column("name").is_none());
        assert!(tables[0].column("full_name").is_some());
    }

    #[test]
    fn backfill_type_checked() {
        let mut tables = vec![def("students")];
        let op = MigrationOp::Backfill {
            table: "students".into(),
            column: "name".into(),
            value: Value::from(3i64),
        };
        assert!(op.apply_to_definitions(&mut tables).is_err());
    }
}
