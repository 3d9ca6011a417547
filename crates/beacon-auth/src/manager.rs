//! Generation of credential id/secret pairs.
//!
//! Ids are checked for uniqueness against every stored credential and
//! against ids this manager issued that the write consumer has not yet
//! applied. The second set closes the window in which two concurrent
//! generations could both pick an id absent from the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_state::StateStore;
use rand::Rng;
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::password;

/// Length of a generated credential id.
pub const ID_LEN: usize = 6;

/// Length of a generated secret.
pub const SECRET_LEN: usize = 10;

/// Characters never used in ids or secrets.
pub const AMBIGUOUS_CHARS: &str = "iI1lo0OBgzsS";

/// Default wait before regenerating after an id collision.
pub const DEFAULT_COLLISION_BACKOFF: Duration = Duration::from_secs(3);

/// A freshly generated credential. `secret` is plaintext and must only be
/// returned to the caller; `secret_hash` is what gets stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCredential {
    pub id: String,
    pub secret: String,
    pub secret_hash: String,
}

#[derive(Clone)]
pub struct CredentialManager {
    store: StateStore,
    collision_backoff: Duration,
    /// Issued ids not yet visible in the store.
    issued: Arc<Mutex<HashSet<String>>>,
}

impl CredentialManager {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            collision_backoff: DEFAULT_COLLISION_BACKOFF,
            issued: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_collision_backoff(mut self, backoff: Duration) -> Self {
        self.collision_backoff = backoff;
        self
    }

    pub fn hash_password(&self, secret: &str) -> String {
        password::hash_password(secret)
    }

    pub fn verify_password(&self, stored: &str, provided: &str) -> bool {
        password::verify_password(stored, provided)
    }

    /// Generate a new credential with an id unused across all tiers.
    pub async fn generate_credential_pair(&self) -> AuthResult<GeneratedCredential> {
        self.generate_with(|| random_string(&id_alphabet(), ID_LEN))
            .await
    }

    async fn generate_with<F>(&self, mut next_id: F) -> AuthResult<GeneratedCredential>
    where
        F: FnMut() -> String,
    {
        let id = loop {
            let candidate = next_id();
            if self.reserve(&candidate)? {
                break candidate;
            }
            warn!(
                id = %candidate,
                backoff_ms = self.collision_backoff.as_millis() as u64,
                "generated credential id already in use, retrying"
            );
            tokio::time::sleep(self.collision_backoff).await;
        };

        let secret = random_string(&secret_alphabet(), SECRET_LEN);
        let to_hash = secret.clone();
        let secret_hash =
            match tokio::task::spawn_blocking(move || password::hash_password(&to_hash)).await {
                Ok(hash) => hash,
                Err(e) => {
                    self.release(&id);
                    return Err(AuthError::Hashing(e.to_string()));
                }
            };

        debug!(%id, "credential pair generated");
        Ok(GeneratedCredential {
            id,
            secret,
            secret_hash,
        })
    }

    /// Issued ids the store does not show yet.
    pub fn reserved(&self) -> usize {
        self.issued.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Give back an id whose credential will never be stored, so it stops
    /// being checked on every later reservation.
    pub fn release(&self, id: &str) {
        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        if issued.remove(id) {
            debug!(%id, "credential id released");
        }
    }

    /// Claim `candidate` if neither the store nor an earlier generation
    /// holds it. The store check runs under the lock so that pruning and
    /// claiming observe the same state.
    fn reserve(&self, candidate: &str) -> AuthResult<bool> {
        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());

        let mut applied = Vec::new();
        for id in issued.iter() {
            if self.store.contains_credential(id)? {
                applied.push(id.clone());
            }
        }
        for id in &applied {
            issued.remove(id);
        }

        if issued.contains(candidate) || self.store.contains_credential(candidate)? {
            return Ok(false);
        }
        issued.insert(candidate.to_string());
        Ok(true)
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("collision_backoff", &self.collision_backoff)
            .finish_non_exhaustive()
    }
}

/// Lowercase letters and digits, minus ambiguous characters.
pub fn id_alphabet() -> Vec<char> {
    ('a'..='z')
        .chain('0'..='9')
        .filter(|c| !AMBIGUOUS_CHARS.contains(*c))
        .collect()
}

/// Lowercase letters, digits and uppercase letters, minus ambiguous characters.
pub fn secret_alphabet() -> Vec<char> {
    ('a'..='z')
        .chain('0'..='9')
        .chain('A'..='Z')
        .filter(|c| !AMBIGUOUS_CHARS.contains(*c))
        .collect()
}

fn random_string(alphabet: &[char], len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::Table;

    fn store_with_ids(ids: &[&str]) -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        let mut writer = store.take_writer().unwrap();
        for id in ids {
            writer
                .insert_row(
                    Table::Credentials,
                    vec![Some(id.to_string()), Some("h".into()), Some("client".into())],
                )
                .unwrap();
        }
        store
    }

    fn scripted(ids: &[&str]) -> impl FnMut() -> String {
        let mut ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        ids.reverse();
        move || ids.pop().expect("script exhausted")
    }

    #[test]
    fn alphabets_exclude_ambiguous_chars() {
        let ids = id_alphabet();
        let secrets = secret_alphabet();
        for c in AMBIGUOUS_CHARS.chars() {
            assert!(!ids.contains(&c));
            assert!(!secrets.contains(&c));
        }
        assert!(ids.iter().all(|c| !c.is_ascii_uppercase()));
        assert_eq!(ids.len(), 28);
        assert_eq!(secrets.len(), 50);
    }

    #[tokio::test]
    async fn generated_pair_has_expected_shape() {
        let manager = CredentialManager::new(store_with_ids(&[]));
        let pair = manager.generate_credential_pair().await.unwrap();

        assert_eq!(pair.id.chars().count(), ID_LEN);
        assert_eq!(pair.secret.chars().count(), SECRET_LEN);
        assert!(pair.id.chars().all(|c| id_alphabet().contains(&c)));
        assert!(pair.secret.chars().all(|c| secret_alphabet().contains(&c)));
        assert_ne!(pair.secret_hash, pair.secret);
        assert!(manager.verify_password(&pair.secret_hash, &pair.secret));
    }

    #[tokio::test]
    async fn collision_with_store_regenerates() {
        let manager = CredentialManager::new(store_with_ids(&["aaaaaa"]))
            .with_collision_backoff(Duration::from_millis(1));
        let pair = manager
            .generate_with(scripted(&["aaaaaa", "bbbbbb"]))
            .await
            .unwrap();
        assert_eq!(pair.id, "bbbbbb");
    }

    #[tokio::test]
    async fn unapplied_ids_are_not_reissued() {
        let manager = CredentialManager::new(store_with_ids(&[]))
            .with_collision_backoff(Duration::from_millis(1));
        let first = manager.generate_with(scripted(&["cccccc"])).await.unwrap();
        let second = manager
            .generate_with(scripted(&["cccccc", "dddddd"]))
            .await
            .unwrap();
        assert_eq!(first.id, "cccccc");
        assert_eq!(second.id, "dddddd");
    }

    #[tokio::test]
    async fn applied_ids_leave_the_issued_set() {
        let store = StateStore::open_in_memory().unwrap();
        let mut writer = store.take_writer().unwrap();
        let manager = CredentialManager::new(store.clone());

        let pair = manager.generate_with(scripted(&["eeeeee"])).await.unwrap();
        writer
            .insert_row(
                Table::Credentials,
                vec![Some(pair.id.clone()), Some(pair.secret_hash), Some("system".into())],
            )
            .unwrap();

        assert!(manager.reserve("ffffff").unwrap());
        {
            let issued = manager.issued.lock().unwrap();
            assert!(!issued.contains("eeeeee"));
            assert!(issued.contains("ffffff"));
        }
        // Now taken by the stored credential.
        assert!(!manager.reserve("eeeeee").unwrap());
    }

    #[tokio::test]
    async fn released_ids_can_be_issued_again() {
        let manager = CredentialManager::new(store_with_ids(&[]))
            .with_collision_backoff(Duration::from_millis(1));
        let first = manager.generate_with(scripted(&["hhhhhh"])).await.unwrap();

        assert_eq!(manager.reserved(), 1);
        manager.release(&first.id);
        assert_eq!(manager.reserved(), 0);

        let again = manager.generate_with(scripted(&["hhhhhh"])).await.unwrap();
        assert_eq!(again.id, "hhhhhh");
        // Releasing an unknown id is harmless.
        manager.release("unknown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_generation_yields_unique_ids() {
        let manager = CredentialManager::new(store_with_ids(&[]))
            .with_collision_backoff(Duration::from_millis(1));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.generate_credential_pair().await.unwrap().id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 8);
    }
}
