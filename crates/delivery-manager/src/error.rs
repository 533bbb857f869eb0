//! Delivery error types.

use delivery_client::EndpointError;
use delivery_queue::QueueError;
use delivery_storage::StorageError;
use thiserror::Error;

/// Errors from credential session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The credential store has not been unlocked yet
    #[error("Credential store is locked")]
    Locked,

    /// Secure store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors returned to callers of the delivery manager.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Operation requires a signed-in session
    #[error("Not signed in")]
    NotSignedIn,

    /// No stored username/password to sign in with
    #[error("No stored credentials")]
    DoesNotHaveCredentials,

    /// A participant account already exists on this device
    #[error("Credentials already exist")]
    AlreadyHasCredentials,

    /// Record failed structural validation and was not enqueued
    #[error("Invalid record")]
    InvalidRecord,

    /// The credential store has not been unlocked yet
    #[error("Credential store is locked")]
    SessionLocked,

    /// Durable queue failure; delivery of the record is uncertain
    #[error("Queue storage error: {0}")]
    Storage(#[from] QueueError),

    /// Credential session failure
    #[error("Session error: {0}")]
    Session(SessionError),

    /// Remote endpoint failure
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

impl From<SessionError> for DeliveryError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Locked => DeliveryError::SessionLocked,
            other => DeliveryError::Session(other),
        }
    }
}

/// Result type alias using DeliveryError.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
