//! Service error types.

use beacon_auth::AuthError;
use beacon_queue::QueueError;
use beacon_state::StateError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("you do not have the proper credentials")]
    Unauthorized,

    #[error("system {0} does not exist")]
    UnknownSystem(String),

    #[error("system {system_id} has no value named {key}")]
    UnknownValue { system_id: String, key: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("an owner credential already exists")]
    AlreadyBootstrapped,

    #[error("provisioned credential {0} failed to authenticate")]
    ProvisionFailed(String),

    #[error("store writer is already owned by another consumer")]
    WriterUnavailable,

    #[error("write consumer task failed: {0}")]
    Consumer(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl ServiceError {
    /// Whether the caller, rather than the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Unauthorized
                | ServiceError::UnknownSystem(_)
                | ServiceError::UnknownValue { .. }
                | ServiceError::InvalidData(_)
                | ServiceError::AlreadyBootstrapped
        )
    }
}
