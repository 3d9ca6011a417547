//! StateStore — redb-backed read access for Beacon.
//!
//! `StateStore` is the shared, cloneable handle every context may use to
//! read credentials and system records. It never mutates: the only way to
//! write is the [`StateWriter`] obtained once through
//! [`StateStore::take_writer`].

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use beacon_core::{Table, TierFilter};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::StateResult;
use crate::tables::*;
use crate::types::*;
use crate::writer::StateWriter;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}
pub(crate) use map_err;

/// Database plus the flag recording whether its writer has been handed out.
pub(crate) struct Shared {
    pub(crate) db: Database,
    writer_taken: AtomicBool,
}

/// Thread-safe read handle over the Beacon tables.
#[derive(Clone)]
pub struct StateStore {
    shared: Arc<Shared>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> StateResult<Self> {
        let store = Self {
            shared: Arc::new(Shared {
                db,
                writer_taken: AtomicBool::new(false),
            }),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.shared.db.begin_write().map_err(map_err!(Storage))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CREDENTIALS).map_err(map_err!(Storage))?;
        txn.open_table(SYSTEM_RECORDS).map_err(map_err!(Storage))?;
        txn.commit().map_err(map_err!(Storage))?;
        Ok(())
    }

    /// Hand out the single mutating handle for this database.
    ///
    /// Returns `None` once the writer has been taken through this handle or
    /// any of its clones.
    pub fn take_writer(&self) -> Option<StateWriter> {
        if self.shared.writer_taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        debug!("state writer handed out");
        Some(StateWriter::new(self.shared.clone()))
    }

    // ── Generic row access ─────────────────────────────────────────

    fn get_row<R: TableRow>(&self, id: &str) -> StateResult<Option<R>> {
        let txn = self.shared.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn
            .open_table(definition(R::TABLE))
            .map_err(map_err!(Storage))?;
        match table.get(id).map_err(map_err!(Storage))? {
            Some(guard) => {
                let row: R =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn list_rows<R: TableRow>(&self) -> StateResult<Vec<R>> {
        let txn = self.shared.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn
            .open_table(definition(R::TABLE))
            .map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let row: R = serde_json::from_slice(value.value()).map_err(map_err!(Corrupt))?;
            results.push(row);
        }
        Ok(results)
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: Table) -> StateResult<u64> {
        let txn = self.shared.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(definition(table)).map_err(map_err!(Storage))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Storage))? {
            entry.map_err(map_err!(Storage))?;
            count += 1;
        }
        Ok(count)
    }

    // ── Credentials ────────────────────────────────────────────────

    /// Get a credential row by id, whatever its tier.
    pub fn credential(&self, id: &str) -> StateResult<Option<CredentialRow>> {
        self.get_row(id)
    }

    /// Get the credential row stored for `(id, tier)`.
    ///
    /// A row whose stored tier text does not match the filter is treated as
    /// absent, including rows whose tier is not a recognized label.
    pub fn credential_for(
        &self,
        id: &str,
        filter: TierFilter,
    ) -> StateResult<Option<CredentialRow>> {
        let row = self.credential(id)?;
        Ok(row.filter(|row| match filter {
            TierFilter::Any => true,
            TierFilter::Only(tier) => row.access_tier.as_deref() == Some(tier.as_str()),
        }))
    }

    /// All credential ids, across every tier.
    pub fn credential_ids(&self) -> StateResult<Vec<CredentialId>> {
        let txn = self.shared.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(CREDENTIALS).map_err(map_err!(Storage))?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, _) = entry.map_err(map_err!(Storage))?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    pub fn contains_credential(&self, id: &str) -> StateResult<bool> {
        let txn = self.shared.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(CREDENTIALS).map_err(map_err!(Storage))?;
        Ok(table.get(id).map_err(map_err!(Storage))?.is_some())
    }

    // ── System records ─────────────────────────────────────────────

    pub fn system(&self, id: &str) -> StateResult<Option<SystemRow>> {
        self.get_row(id)
    }

    pub fn list_systems(&self) -> StateResult<Vec<SystemRow>> {
        self.list_rows()
    }

    /// Last heartbeat of a system, `None` if the system is unknown or has
    /// not reported yet.
    pub fn heartbeat(&self, id: &str) -> StateResult<Option<String>> {
        Ok(self.system(id)?.and_then(|row| row.heartbeat))
    }

    /// Decoded telemetry of a system, `None` if the system is unknown.
    pub fn telemetry(&self, id: &str) -> StateResult<Option<Telemetry>> {
        self.system(id)?.map(|row| row.telemetry()).transpose()
    }

    /// A single telemetry value, `None` if the system or key is unknown.
    pub fn telemetry_value(&self, id: &str, key: &str) -> StateResult<Option<serde_json::Value>> {
        Ok(self.telemetry(id)?.and_then(|mut t| t.remove(key)))
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("writer_taken", &self.shared.writer_taken.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
