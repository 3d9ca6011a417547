//! redb table definitions for the Beacon state store.
//!
//! Both tables use `&str` row ids as keys and `&[u8]` values holding the
//! JSON-serialized row (see [`crate::types`]).

use beacon_core::Table;
use redb::TableDefinition;

/// Credential rows keyed by credential id.
pub const CREDENTIALS: TableDefinition<&str, &[u8]> = TableDefinition::new("credentials");

/// System record rows keyed by system id.
pub const SYSTEM_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("system_records");

/// Map a logical table to its redb definition.
pub fn definition(table: Table) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match table {
        Table::Credentials => CREDENTIALS,
        Table::SystemRecords => SYSTEM_RECORDS,
    }
}
