//! beacon-auth — credentials and access control for Beacon.
//!
//! - [`password`]: salted PBKDF2-HMAC-SHA512 hashing and verification
//! - [`CredentialManager`]: id/secret generation with cross-tier uniqueness
//! - [`AccessControl`]: tier checks over the credential store
//!
//! Nothing here writes to the store. New credentials are persisted by
//! enqueueing an insert for the write consumer.

pub mod access;
pub mod error;
pub mod manager;
pub mod password;

pub use access::AccessControl;
pub use error::{AuthError, AuthResult};
pub use manager::{CredentialManager, GeneratedCredential};
pub use password::{hash_password, verify_password};
