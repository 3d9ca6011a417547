//! Salted password hashing.
//!
//! Stored format: `salt || derived`, both lowercase hex.
//!
//! - salt: SHA-256 over 60 bytes from the OS RNG (64 chars)
//! - derived: PBKDF2-HMAC-SHA512 over the UTF-8 secret, keyed by the ASCII
//!   salt text, 100 000 rounds (128 chars)

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

/// PBKDF2 iteration count.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Length of the hex salt prefix.
pub const SALT_LEN: usize = 64;

/// Length of the hex derived-hash suffix.
pub const DERIVED_LEN: usize = 128;

/// Total length of a stored hash.
pub const STORED_LEN: usize = SALT_LEN + DERIVED_LEN;

const SEED_BYTES: usize = 60;

/// Hash a secret under a fresh random salt.
pub fn hash_password(secret: &str) -> String {
    let salt = fresh_salt();
    let derived = derive(secret, &salt);
    let mut stored = salt;
    stored.push_str(&derived);
    stored
}

/// Check `provided` against a stored `salt || derived` hash.
///
/// A stored value of the wrong shape never verifies.
pub fn verify_password(stored: &str, provided: &str) -> bool {
    if stored.len() != STORED_LEN || !stored.is_ascii() {
        return false;
    }
    let (salt, expected) = stored.split_at(SALT_LEN);
    let derived = derive(provided, salt);
    derived.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn fresh_salt() -> String {
    let mut seed = [0u8; SEED_BYTES];
    OsRng.fill_bytes(&mut seed);
    hex::encode(Sha256::digest(seed))
}

fn derive(secret: &str, salt: &str) -> String {
    let mut out = [0u8; DERIVED_LEN / 2];
    pbkdf2::pbkdf2_hmac::<Sha512>(secret.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut out);
    hex::encode(out)
}
