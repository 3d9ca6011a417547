//! Queued descriptions of a single store mutation.

use beacon_core::Table;
use beacon_state::{Field, StateResult, StateWriter};
use serde::{Deserialize, Serialize};

/// One store mutation. Intents serialize with an `op` tag so they can also
/// be submitted pre-encoded (see [`crate::WriteQueue::submit_encoded`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteIntent {
    /// Append a new row; `values` are ordered as [`Table::columns`].
    InsertRow { table: Table, values: Vec<Field> },
    /// Overwrite one column of the row with the given id.
    UpdateColumn {
        table: Table,
        id: String,
        column: String,
        value: Field,
    },
    /// Set one telemetry key of a system, keeping all other keys.
    MergeTelemetry {
        system_id: String,
        key: String,
        value: serde_json::Value,
    },
}

/// What applying an intent did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// An update whose target row does not exist. Nothing was written.
    NoMatchingRow,
}

impl WriteIntent {
    pub fn insert_row<I, S>(table: Table, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WriteIntent::InsertRow {
            table,
            values: values.into_iter().map(|v| Some(v.into())).collect(),
        }
    }

    pub fn update_column(
        table: Table,
        id: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        WriteIntent::UpdateColumn {
            table,
            id: id.into(),
            column: column.into(),
            value: Some(value.into()),
        }
    }

    pub fn merge_telemetry(
        system_id: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        WriteIntent::MergeTelemetry {
            system_id: system_id.into(),
            key: key.into(),
            value,
        }
    }

    /// The `op` tag of this intent.
    pub fn op(&self) -> &'static str {
        match self {
            WriteIntent::InsertRow { .. } => "insert_row",
            WriteIntent::UpdateColumn { .. } => "update_column",
            WriteIntent::MergeTelemetry { .. } => "merge_telemetry",
        }
    }

    /// Apply this intent through the single writer.
    pub fn apply(self, writer: &mut StateWriter) -> StateResult<Outcome> {
        match self {
            WriteIntent::InsertRow { table, values } => {
                writer.insert_row(table, values)?;
                Ok(Outcome::Applied)
            }
            WriteIntent::UpdateColumn {
                table,
                id,
                column,
                value,
            } => {
                if writer.update_column(table, &id, &column, value)? {
                    Ok(Outcome::Applied)
                } else {
                    Ok(Outcome::NoMatchingRow)
                }
            }
            WriteIntent::MergeTelemetry {
                system_id,
                key,
                value,
            } => {
                writer.merge_telemetry(&system_id, &key, value)?;
                Ok(Outcome::Applied)
            }
        }
    }
}
