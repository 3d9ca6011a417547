//! Status service operations.
//!
//! Every mutation is enqueued for the write consumer; every read goes
//! straight to the store. Callers authenticate on each call with their
//! credential id and secret.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use beacon_auth::{AccessControl, CredentialManager, GeneratedCredential};
use beacon_core::{AccessTier, Table, TierFilter};
use beacon_queue::{WriteIntent, WriteQueue};
use beacon_state::{Credential, StateStore, SystemRow};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};

/// Tiers allowed to read system values.
const READER_TIERS: [AccessTier; 3] = [AccessTier::Client, AccessTier::Admin, AccessTier::Owner];

/// A newly issued credential. `auth` is the plaintext secret and is never
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub id: String,
    pub auth: String,
}

impl From<GeneratedCredential> for IssuedCredential {
    fn from(pair: GeneratedCredential) -> Self {
        Self {
            id: pair.id,
            auth: pair.secret,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusService {
    store: StateStore,
    credentials: CredentialManager,
    access: AccessControl,
    queue: WriteQueue,
    provision_verify: bool,
    bootstrap: Arc<Mutex<()>>,
}

impl StatusService {
    pub fn new(
        store: StateStore,
        credentials: CredentialManager,
        queue: WriteQueue,
        provision_verify: bool,
    ) -> Self {
        Self {
            access: AccessControl::new(store.clone()),
            store,
            credentials,
            queue,
            provision_verify,
            bootstrap: Arc::new(Mutex::new(())),
        }
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// True iff the pair matches a credential of any tier.
    pub async fn check_auth(&self, id: &str, secret: &str) -> bool {
        self.access.authorize(id, secret, TierFilter::Any).await
    }

    /// Issue a credential of `tier` on behalf of the caller.
    ///
    /// Creating an admin requires an owner caller; every other tier accepts
    /// admin or owner. System credentials also get an empty system record.
    /// Returns once the new credential is applied and, if enabled, verified.
    pub async fn provision(
        &self,
        caller_id: &str,
        caller_secret: &str,
        tier: AccessTier,
    ) -> ServiceResult<IssuedCredential> {
        let allowed = match tier {
            AccessTier::Admin => {
                self.access
                    .authorize(caller_id, caller_secret, AccessTier::Owner)
                    .await
            }
            _ => {
                let tiers = [AccessTier::Admin, AccessTier::Owner];
                self.access
                    .authorize_any(caller_id, caller_secret, &tiers)
                    .await
            }
        };
        if !allowed {
            warn!(caller = %caller_id, %tier, "provision rejected");
            return Err(ServiceError::Unauthorized);
        }

        let issued = self.issue(tier).await?;
        info!(caller = %caller_id, id = %issued.id, %tier, "credential provisioned");
        Ok(issued)
    }

    /// Create the first owner credential. Fails once any credential exists.
    pub async fn bootstrap_owner(&self) -> ServiceResult<IssuedCredential> {
        let _guard = self.bootstrap.lock().await;
        // Anything still queued may be a credential insert.
        self.queue.sync().await?;
        if self.store.row_count(Table::Credentials)? > 0 {
            return Err(ServiceError::AlreadyBootstrapped);
        }

        let issued = self.issue(AccessTier::Owner).await?;
        info!(id = %issued.id, "owner credential bootstrapped");
        Ok(issued)
    }

    /// Record a heartbeat for the calling system. Returns the timestamp
    /// that was enqueued.
    pub async fn record_heartbeat(&self, id: &str, secret: &str) -> ServiceResult<u64> {
        self.require(id, secret, AccessTier::System).await?;

        let now = epoch_secs();
        self.queue.submit(WriteIntent::update_column(
            Table::SystemRecords,
            id,
            "heartbeat",
            now.to_string(),
        ))?;
        debug!(%id, heartbeat = now, "heartbeat queued");
        Ok(now)
    }

    /// Store `data` (JSON text) under `key` in the calling system's
    /// telemetry, keeping all other keys.
    pub async fn update_value(
        &self,
        id: &str,
        secret: &str,
        key: &str,
        data: &str,
    ) -> ServiceResult<()> {
        self.require(id, secret, AccessTier::System).await?;

        let value: serde_json::Value =
            serde_json::from_str(data).map_err(|e| ServiceError::InvalidData(e.to_string()))?;
        self.queue
            .submit(WriteIntent::merge_telemetry(id, key, value))?;
        debug!(%id, %key, "telemetry update queued");
        Ok(())
    }

    /// Read one telemetry value of `system_id`.
    pub async fn fetch_value(
        &self,
        id: &str,
        secret: &str,
        system_id: &str,
        key: &str,
    ) -> ServiceResult<serde_json::Value> {
        self.require_reader(id, secret).await?;

        let mut telemetry = self.system(system_id)?.telemetry()?;
        telemetry
            .remove(key)
            .ok_or_else(|| ServiceError::UnknownValue {
                system_id: system_id.to_string(),
                key: key.to_string(),
            })
    }

    /// Last heartbeat of `system_id`, or `None` if it never sent one.
    pub async fn fetch_heartbeat(
        &self,
        id: &str,
        secret: &str,
        system_id: &str,
    ) -> ServiceResult<Option<String>> {
        self.require_reader(id, secret).await?;
        Ok(self.system(system_id)?.heartbeat)
    }

    async fn issue(&self, tier: AccessTier) -> ServiceResult<IssuedCredential> {
        let pair = self.credentials.generate_credential_pair().await?;
        let id = pair.id.clone();

        match self.store_and_verify(pair, tier).await {
            Ok(issued) => Ok(issued),
            Err(e) => {
                self.credentials.release(&id);
                warn!(%id, %tier, error = %e, "credential not issued");
                Err(e)
            }
        }
    }

    async fn store_and_verify(
        &self,
        pair: GeneratedCredential,
        tier: AccessTier,
    ) -> ServiceResult<IssuedCredential> {
        let credential = Credential {
            id: pair.id.clone(),
            password_hash: pair.secret_hash.clone(),
            tier,
        };
        self.queue.submit(WriteIntent::InsertRow {
            table: Table::Credentials,
            values: credential.into_fields(),
        })?;
        if tier == AccessTier::System {
            self.queue.submit(WriteIntent::InsertRow {
                table: Table::SystemRecords,
                values: SystemRow::initial_fields(&pair.id),
            })?;
        }
        self.queue.sync().await?;

        if self.provision_verify && !self.check_auth(&pair.id, &pair.secret).await {
            return Err(ServiceError::ProvisionFailed(pair.id));
        }
        Ok(pair.into())
    }

    async fn require(&self, id: &str, secret: &str, tier: AccessTier) -> ServiceResult<()> {
        if self.access.authorize(id, secret, tier).await {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }

    async fn require_reader(&self, id: &str, secret: &str) -> ServiceResult<()> {
        if self.access.authorize_any(id, secret, &READER_TIERS).await {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }

    fn system(&self, system_id: &str) -> ServiceResult<SystemRow> {
        self.store
            .system(system_id)?
            .ok_or_else(|| ServiceError::UnknownSystem(system_id.to_string()))
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
