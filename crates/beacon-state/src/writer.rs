//! StateWriter — the only mutating handle over the Beacon tables.
//!
//! A `StateWriter` is not `Clone` and is handed out at most once per opened
//! database. Whoever owns it is the single writer, which is what makes the
//! read-modify-write in [`StateWriter::merge_telemetry`] safe without any
//! further locking. Every call runs in its own redb write transaction and
//! commits individually.

use std::sync::Arc;

use beacon_core::Table;
use redb::ReadableTable;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{Shared, map_err};
use crate::tables::*;
use crate::types::*;

pub struct StateWriter {
    shared: Arc<Shared>,
}

impl StateWriter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Append a new row built from fields ordered as [`Table::columns`].
    pub fn insert_row(&mut self, table: Table, fields: Vec<Field>) -> StateResult<()> {
        match table {
            Table::Credentials => self.insert(CredentialRow::from_fields(fields)?),
            Table::SystemRecords => self.insert(SystemRow::from_fields(fields)?),
        }
    }

    /// Overwrite one column of one row. Returns whether a row was affected;
    /// a missing row is not an error and creates nothing.
    pub fn update_column(
        &mut self,
        table: Table,
        id: &str,
        column: &str,
        value: Field,
    ) -> StateResult<bool> {
        if !table.has_column(column) || column == "id" {
            return Err(StateError::Unsupported(format!(
                "cannot update {table}.{column}"
            )));
        }
        match table {
            Table::Credentials => {
                self.modify::<CredentialRow, _>(id, |row| row.set_column(column, value))
            }
            Table::SystemRecords => {
                self.modify::<SystemRow, _>(id, |row| row.set_column(column, value))
            }
        }
    }

    /// Set `telemetry[key] = value` for one system, leaving every other key
    /// untouched.
    pub fn merge_telemetry(
        &mut self,
        system_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> StateResult<()> {
        let affected = self.modify::<SystemRow, _>(system_id, |row| {
            let mut telemetry = row.telemetry()?;
            telemetry.insert(key.to_string(), value);
            let encoded = serde_json::to_string(&telemetry).map_err(map_err!(Encode))?;
            row.telemetry = Some(encoded);
            Ok(())
        })?;
        if !affected {
            return Err(StateError::NotFound(format!("system {system_id}")));
        }
        Ok(())
    }

    fn insert<R: TableRow>(&mut self, row: R) -> StateResult<()> {
        let value = serde_json::to_vec(&row).map_err(map_err!(Encode))?;
        let txn = self.shared.db.begin_write().map_err(map_err!(Storage))?;
        {
            let mut table = txn
                .open_table(definition(R::TABLE))
                .map_err(map_err!(Storage))?;
            if table.get(row.id()).map_err(map_err!(Storage))?.is_some() {
                return Err(StateError::Conflict(format!(
                    "{} already has a row with id {}",
                    R::TABLE,
                    row.id()
                )));
            }
            table
                .insert(row.id(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Storage))?;
        debug!(table = %R::TABLE, id = %row.id(), "row inserted");
        Ok(())
    }

    /// Read one row, apply `change` and write it back inside a single write
    /// transaction. Returns false without writing if the row does not exist;
    /// an error from `change` aborts the transaction.
    fn modify<R, F>(&mut self, id: &str, change: F) -> StateResult<bool>
    where
        R: TableRow,
        F: FnOnce(&mut R) -> StateResult<()>,
    {
        let txn = self.shared.db.begin_write().map_err(map_err!(Storage))?;
        {
            let mut table = txn
                .open_table(definition(R::TABLE))
                .map_err(map_err!(Storage))?;
            let existing = table
                .get(id)
                .map_err(map_err!(Storage))?
                .map(|guard| guard.value().to_vec());
            let Some(bytes) = existing else {
                debug!(table = %R::TABLE, %id, "no row to modify");
                return Ok(false);
            };
            let mut row: R = serde_json::from_slice(&bytes).map_err(map_err!(Corrupt))?;
            change(&mut row)?;
            let value = serde_json::to_vec(&row).map_err(map_err!(Encode))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Storage))?;
        debug!(table = %R::TABLE, %id, "row modified");
        Ok(true)
    }
}

impl std::fmt::Debug for StateWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWriter").finish_non_exhaustive()
    }
}
