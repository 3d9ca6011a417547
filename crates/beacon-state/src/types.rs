//! Row types for the Beacon state store.
//!
//! Rows mirror the logical column layout of each [`Table`]: a required `id`
//! plus nullable text columns. They are JSON-serialized into redb values.
//! Typed views ([`Credential`], [`Telemetry`]) are derived on read.

use std::collections::BTreeMap;

use beacon_core::{AccessTier, Table};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Unique identifier for a credential. System records share the id of the
/// system credential that owns them.
pub type CredentialId = String;

/// Per-system mapping of named telemetry values.
pub type Telemetry = BTreeMap<String, serde_json::Value>;

/// A value for one column of an inserted row. `None` is a NULL column.
pub type Field = Option<String>;

/// Behaviour shared by the rows of both tables.
pub trait TableRow: Sized + Serialize + for<'de> Deserialize<'de> {
    const TABLE: Table;

    fn id(&self) -> &str;

    /// Build a row from values ordered as [`Table::columns`].
    fn from_fields(fields: Vec<Field>) -> StateResult<Self>;

    /// Overwrite a single non-id column.
    fn set_column(&mut self, column: &str, value: Field) -> StateResult<()>;
}

/// Split positional fields into the row id and the remaining columns,
/// checking the count against the table layout.
fn split_fields(table: Table, fields: Vec<Field>) -> StateResult<(String, Vec<Field>)> {
    let expected = table.columns().len();
    if fields.len() != expected {
        return Err(StateError::Unsupported(format!(
            "{table} expects {expected} fields, got {}",
            fields.len()
        )));
    }
    let mut iter = fields.into_iter();
    let id = iter
        .next()
        .flatten()
        .ok_or_else(|| StateError::Unsupported(format!("{table} row id must not be null")))?;
    Ok((id, iter.collect()))
}

fn unknown_column(table: Table, column: &str) -> StateError {
    if column == "id" {
        StateError::Unsupported(format!("{table}.id cannot be updated"))
    } else {
        StateError::Unsupported(format!("{table} has no column {column:?}"))
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// Stored credential row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRow {
    pub id: CredentialId,
    pub password_hash: Option<String>,
    pub access_tier: Option<String>,
}

impl TableRow for CredentialRow {
    const TABLE: Table = Table::Credentials;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_fields(fields: Vec<Field>) -> StateResult<Self> {
        let (id, mut rest) = split_fields(Self::TABLE, fields)?;
        let access_tier = rest.pop().flatten();
        let password_hash = rest.pop().flatten();
        Ok(Self {
            id,
            password_hash,
            access_tier,
        })
    }

    fn set_column(&mut self, column: &str, value: Field) -> StateResult<()> {
        match column {
            "password_hash" => self.password_hash = value,
            "access_tier" => self.access_tier = value,
            other => return Err(unknown_column(Self::TABLE, other)),
        }
        Ok(())
    }
}

impl CredentialRow {
    /// Typed view of this row, or `None` when a column holds a value that
    /// does not fit the credential model.
    pub fn to_credential(&self) -> Option<Credential> {
        let tier = self.access_tier.as_deref()?.parse().ok()?;
        Some(Credential {
            id: self.id.clone(),
            password_hash: self.password_hash.clone()?,
            tier,
        })
    }
}

/// A well-formed credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: CredentialId,
    pub password_hash: String,
    pub tier: AccessTier,
}

impl Credential {
    /// Positional fields for inserting this credential.
    pub fn into_fields(self) -> Vec<Field> {
        vec![
            Some(self.id),
            Some(self.password_hash),
            Some(self.tier.as_str().to_string()),
        ]
    }
}

// ── System records ────────────────────────────────────────────────

/// Stored system record row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemRow {
    pub id: CredentialId,
    pub display_name: Option<String>,
    /// Seconds since the epoch, as text. Absent until the first heartbeat.
    pub heartbeat: Option<String>,
    /// JSON-encoded [`Telemetry`] mapping.
    pub telemetry: Option<String>,
}

impl TableRow for SystemRow {
    const TABLE: Table = Table::SystemRecords;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_fields(fields: Vec<Field>) -> StateResult<Self> {
        let (id, mut rest) = split_fields(Self::TABLE, fields)?;
        let telemetry = rest.pop().flatten();
        let heartbeat = rest.pop().flatten();
        let display_name = rest.pop().flatten();
        Ok(Self {
            id,
            display_name,
            heartbeat,
            telemetry,
        })
    }

    fn set_column(&mut self, column: &str, value: Field) -> StateResult<()> {
        match column {
            "display_name" => self.display_name = value,
            "heartbeat" => self.heartbeat = value,
            "telemetry" => self.telemetry = value,
            other => return Err(unknown_column(Self::TABLE, other)),
        }
        Ok(())
    }
}

impl SystemRow {
    /// Fields for a freshly provisioned system: no name, no heartbeat,
    /// empty telemetry.
    pub fn initial_fields(id: &str) -> Vec<Field> {
        vec![
            Some(id.to_string()),
            Some(String::new()),
            None,
            Some("{}".to_string()),
        ]
    }

    /// Decode the telemetry column.
    pub fn telemetry(&self) -> StateResult<Telemetry> {
        let raw = self.telemetry.as_deref().ok_or_else(|| {
            StateError::Corrupt(format!("system {} has no telemetry", self.id))
        })?;
        serde_json::from_str(raw).map_err(|e| {
            StateError::Corrupt(format!("telemetry for system {}: {e}", self.id))
        })
    }

    /// Display name, treating an empty string as absent.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref().filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(values: &[&str]) -> Vec<Field> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn credential_row_from_fields() {
        let row = CredentialRow::from_fields(fields(&["u1", "hash1", "client"])).unwrap();
        assert_eq!(row.id(), "u1");
        assert_eq!(row.password_hash.as_deref(), Some("hash1"));
        assert_eq!(
            row.to_credential().unwrap().tier,
            AccessTier::Client
        );
    }

    #[test]
    fn field_count_mismatch_is_unsupported() {
        let err = CredentialRow::from_fields(fields(&["u1", "hash1"])).unwrap_err();
        assert!(matches!(err, StateError::Unsupported(_)));

        let err = SystemRow::from_fields(fields(&["s1", "", "", "{}", "extra"])).unwrap_err();
        assert!(matches!(err, StateError::Unsupported(_)));
    }

    #[test]
    fn null_row_id_is_unsupported() {
        let err = SystemRow::from_fields(vec![None, None, None, None]).unwrap_err();
        assert!(matches!(err, StateError::Unsupported(_)));
    }

    #[test]
    fn malformed_credential_has_no_typed_view() {
        let bad_tier = CredentialRow {
            id: "u1".into(),
            password_hash: Some("h".into()),
            access_tier: Some("superuser".into()),
        };
        assert!(bad_tier.to_credential().is_none());

        let no_hash = CredentialRow {
            id: "u1".into(),
            password_hash: None,
            access_tier: Some("client".into()),
        };
        assert!(no_hash.to_credential().is_none());
    }

    #[test]
    fn set_column_rejects_id_and_unknown() {
        let mut row = SystemRow::from_fields(SystemRow::initial_fields("s1")).unwrap();
        row.set_column("heartbeat", Some("1000".into())).unwrap();
        assert_eq!(row.heartbeat.as_deref(), Some("1000"));

        assert!(matches!(
            row.set_column("id", Some("s2".into())),
            Err(StateError::Unsupported(_))
        ));
        assert!(matches!(
            row.set_column("uptime", None),
            Err(StateError::Unsupported(_))
        ));
    }

    #[test]
    fn telemetry_decoding() {
        let mut row = SystemRow::from_fields(SystemRow::initial_fields("s1")).unwrap();
        assert!(row.telemetry().unwrap().is_empty());
        assert_eq!(row.display_name(), None);

        row.telemetry = Some(r#"{"temp":42,"tags":["a"]}"#.into());
        let telemetry = row.telemetry().unwrap();
        assert_eq!(telemetry["temp"], json!(42));
        assert_eq!(telemetry["tags"], json!(["a"]));

        row.telemetry = Some("[1,2]".into());
        assert!(matches!(row.telemetry(), Err(StateError::Corrupt(_))));

        row.telemetry = None;
        assert!(matches!(row.telemetry(), Err(StateError::Corrupt(_))));
    }
}
