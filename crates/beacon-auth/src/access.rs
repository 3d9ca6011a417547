//! Tier checks for an (id, secret) pair.
//!
//! Tiers are unordered labels. A caller holding an `owner` credential does
//! not pass an `admin` check; callers that accept several tiers use
//! [`AccessControl::authorize_any`].

use beacon_core::{AccessTier, TierFilter};
use beacon_state::StateStore;
use tracing::{error, warn};

use crate::password::verify_password;

#[derive(Debug, Clone)]
pub struct AccessControl {
    store: StateStore,
}

impl AccessControl {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// True iff a credential exists for `(id, filter)` and `secret` matches
    /// its stored hash. Storage errors and malformed rows count as failure.
    ///
    /// The key derivation runs on the blocking pool.
    pub async fn authorize(&self, id: &str, secret: &str, filter: impl Into<TierFilter>) -> bool {
        let filter = filter.into();
        let row = match self.store.credential_for(id, filter) {
            Ok(Some(row)) => row,
            Ok(None) => return false,
            Err(e) => {
                warn!(%id, tier = %filter, error = %e, "credential lookup failed");
                return false;
            }
        };
        let Some(stored) = row.password_hash else {
            warn!(%id, tier = %filter, "stored credential has no password hash");
            return false;
        };

        let provided = secret.to_string();
        match tokio::task::spawn_blocking(move || verify_password(&stored, &provided)).await {
            Ok(verified) => verified,
            Err(e) => {
                error!(%id, error = %e, "password verification task failed");
                false
            }
        }
    }

    /// Like [`authorize`](Self::authorize) with a textual tier (`any` or a
    /// tier name). Unrecognized labels are logged and rejected.
    pub async fn authorize_label(&self, id: &str, secret: &str, label: &str) -> bool {
        match label.parse::<TierFilter>() {
            Ok(filter) => self.authorize(id, secret, filter).await,
            Err(e) => {
                error!(%id, error = %e, "unrecognized access tier in authorization");
                false
            }
        }
    }

    /// True iff `authorize` succeeds for at least one of `tiers`.
    pub async fn authorize_any(&self, id: &str, secret: &str, tiers: &[AccessTier]) -> bool {
        for tier in tiers {
            if self.authorize(id, secret, *tier).await {
                return true;
            }
        }
        false
    }
}
