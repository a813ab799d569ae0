//! Write transactions.
//!
//! A [`WriteTransaction`] mutates a private working copy of the store
//! state. Nothing is visible to readers until the transaction closure
//! returns `Ok` and the store swaps the committed snapshot; an error or
//! panic on any exit path discards every staged write.

use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult, StoreError, StoreResult};
use crate::migration::MigrationOp;
use crate::record::{Record, RecordId, Timestamp};
use crate::schema::{SchemaVersion, TableDefinition};
use crate::store::{StoreState, TableData};
use crate::value::Value;

/// Scoped, exclusive write access to the store.
///
/// All writes stamp `updated_at` (and `created_at` on first insert)
/// from the store clock; callers never supply timestamps. The one
/// exception is [`WriteTransaction::put_replica`], which the
/// synchronizer uses to apply remote records verbatim.
pub struct WriteTransaction<'a> {
    state: &'a mut StoreState,
    clock: &'a dyn Clock,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(state: &'a mut StoreState, clock: &'a dyn Clock) -> Self {
        Self { state, clock }
    }

    fn table_mut(&mut self, table: &str) -> StoreResult<&mut TableData> {
        self.state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::table_not_found(table))
    }

    fn table(&self, table: &str) -> StoreResult<&TableData> {
        self.state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))
    }

    /// Returns the schema version of the working state.
    pub fn schema_version(&self) -> SchemaVersion {
        self.state.schema_version
    }

    /// Reads a record from the working state, staged writes included.
    pub fn get(&self, table: &str, id: &RecordId) -> StoreResult<Option<Record>> {
        Ok(self.table(table)?.rows.get(id).cloned())
    }

    /// Inserts a new record.
    ///
    /// Fields are validated against the table definition and defaults
    /// are filled in. Inserting an id that already exists as a live row
    /// is a constraint violation; inserting over a tombstone revives
    /// the row, keeping its original `created_at`.
    pub fn insert(
        &mut self,
        table: &str,
        id: RecordId,
        mut fields: BTreeMap<String, Value>,
    ) -> StoreResult<RecordId> {
        let now = self.clock.now();
        let data = self.table(table)?;
        data.definition.normalize_fields(&mut fields)?;

        if let Some(existing) = data.rows.get(&id) {
            if existing.is_live() {
                return Err(StoreError::constraint(
                    table,
                    "id",
                    format!("record {} already exists", id),
                ));
            }
        }

        let data = self.table_mut(table)?;
        let created_at = data.rows.get(&id).map(|r| r.created_at).unwrap_or(now);
        data.rows.insert(
            id.clone(),
            Record {
                id: id.clone(),
                fields,
                created_at,
                updated_at: now,
                deleted: false,
            },
        );
        Ok(id)
    }

    /// Replaces the fields of an existing live record.
    pub fn update(
        &mut self,
        table: &str,
        id: &RecordId,
        mut fields: BTreeMap<String, Value>,
    ) -> StoreResult<()> {
        let now = self.clock.now();
        let data = self.table(table)?;
        data.definition.normalize_fields(&mut fields)?;

        let data = self.table_mut(table)?;
        match data.rows.get_mut(id) {
            Some(record) if record.is_live() => {
                record.fields = fields;
                record.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Soft-deletes a record.
    ///
    /// The row stays in the table as a tombstone so a later sync pass
    /// can propagate the deletion; only compaction removes it.
    pub fn delete(&mut self, table: &str, id: &RecordId) -> StoreResult<()> {
        let now = self.clock.now();
        let data = self.table_mut(table)?;
        match data.rows.get_mut(id) {
            Some(record) if record.is_live() => {
                record.deleted = true;
                record.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::RecordNotFound {
                table: table.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Writes a record exactly as received from the remote authority.
    ///
    /// Timestamps and the tombstone flag are taken from the record
    /// rather than stamped; field types are still validated.
    pub fn put_replica(&mut self, table: &str, mut record: Record) -> StoreResult<()> {
        let data = self.table(table)?;
        data.definition.normalize_fields(&mut record.fields)?;

        let data = self.table_mut(table)?;
        data.rows.insert(record.id.clone(), record);
        Ok(())
    }

    /// Advances the table's sync cursor.
    ///
    /// Moving a cursor backwards without `force` is
    /// [`LedgerError::Regression`]; `force` exists only for explicit
    /// full-resync recovery. The new watermark commits atomically with
    /// every other write staged in this transaction.
    pub fn advance_cursor(
        &mut self,
        table: &str,
        watermark: Timestamp,
        force: bool,
    ) -> LedgerResult<()> {
        let stored = self.state.cursors.get(table).copied().unwrap_or(0);
        if watermark < stored && !force {
            return Err(LedgerError::Regression {
                table: table.to_string(),
                stored,
                attempted: watermark,
            });
        }
        self.state.cursors.insert(table.to_string(), watermark);
        Ok(())
    }

    /// Physically removes tombstones that sync has already propagated.
    ///
    /// A tombstone is dropped when its `updated_at` is at or below the
    /// table's cursor (the deletion has been pushed) and older than the
    /// caller-supplied horizon. Returns the number of rows removed.
    pub fn compact(&mut self, table: &str, horizon: Timestamp) -> StoreResult<usize> {
        let cursor = self.state.cursors.get(table).copied().unwrap_or(0);
        let data = self.table_mut(table)?;
        let before = data.rows.len();
        data.rows
            .retain(|_, r| r.is_live() || r.updated_at > cursor || r.updated_at > horizon);
        Ok(before - data.rows.len())
    }

    /// Creates a table in the working state. Migration engine use.
    pub fn create_table(&mut self, definition: TableDefinition) -> StoreResult<()> {
        if self.state.tables.contains_key(&definition.name) {
            return Err(StoreError::constraint(
                definition.name.clone(),
                "table",
                "table already exists",
            ));
        }
        self.state
            .tables
            .insert(definition.name.clone(), TableData::new(definition));
        Ok(())
    }

    /// Stamps the schema version of the working state.
    pub fn set_schema_version(&mut self, version: SchemaVersion) {
        self.state.schema_version = version;
    }

    /// Applies one migration operation: the table shape change plus the
    /// matching row rewrite.
    pub fn apply_migration_op(&mut self, op: &MigrationOp) -> StoreResult<()> {
        match op {
            MigrationOp::CreateTable(def) => self.create_table(def.clone()),
            MigrationOp::DropTable { name } => {
                if self.state.tables.remove(name).is_none() {
                    return Err(StoreError::table_not_found(name));
                }
                self.state.cursors.remove(name);
                Ok(())
            }
            MigrationOp::AddColumn { table, column } => {
                let fill = column.default.clone().unwrap_or(Value::Null);
                if !column.nullable && fill.is_null() {
                    return Err(StoreError::constraint(
                        table,
                        column.name.clone(),
                        "non-nullable column added without a default",
                    ));
                }
                let data = self.table_mut(table)?;
                if data.definition.column(&column.name).is_some() {
                    return Err(StoreError::constraint(
                        table,
                        column.name.clone(),
                        "column already exists",
                    ));
                }
                data.definition.columns.push(column.clone());
                for record in data.rows.values_mut() {
                    record.fields.insert(column.name.clone(), fill.clone());
                }
                Ok(())
            }
            MigrationOp::RenameColumn { table, from, to } => {
                let data = self.table_mut(table)?;
                if data.definition.column(to).is_some() {
                    return Err(StoreError::constraint(table, to.clone(), "column already exists"));
                }
                let column = data
                    .definition
                    .columns
                    .iter_mut()
                    .find(|c| &c.name == from)
                    .ok_or_else(|| {
                        StoreError::constraint(table, from.clone(), "column does not exist")
                    })?;
                column.name = to.clone();
                for record in data.rows.values_mut() {
                    if let Some(value) = record.fields.remove(from) {
                        record.fields.insert(to.clone(), value);
                    }
                }
                Ok(())
            }
            MigrationOp::DropColumn { table, column } => {
                let data = self.table_mut(table)?;
                let before = data.definition.columns.len();
                data.definition.columns.retain(|c| &c.name != column);
                if data.definition.columns.len() == before {
                    return Err(StoreError::constraint(
                        table,
                        column.clone(),
                        "column does not exist",
                    ));
                }
                for record in data.rows.values_mut() {
                    record.fields.remove(column);
                }
                Ok(())
            }
            MigrationOp::Backfill {
                table,
                column,
                value,
            } => {
                let data = self.table_mut(table)?;
                let col = data.definition.column(column).ok_or_else(|| {
                    StoreError::constraint(table, column.clone(), "column does not exist")
                })?;
                if !value.matches(col.column_type) {
                    return Err(StoreError::constraint(
                        table,
                        column.clone(),
                        format!("backfill value does not match type {}", col.column_type),
                    ));
                }
                for record in data.rows.values_mut() {
                    let cell = record
                        .fields
                        .entry(column.clone())
                        .or_insert(Value::Null);
                    if cell.is_null() {
                        *cell = value.clone();
                    }
                }
                Ok(())
            }
        }
    }
}
