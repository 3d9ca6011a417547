//! Error types for credential management.

use beacon_state::StateError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("password hashing task failed: {0}")]
    Hashing(String),
}
