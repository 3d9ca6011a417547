//! Store errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    /// Any redb transaction, table, read or write failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to encode row: {0}")]
    Encode(String),

    /// A stored row or telemetry blob does not decode.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The operation is structurally invalid for the target table.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A row with the same primary key already exists.
    #[error("duplicate row: {0}")]
    Conflict(String),
}
