//! Endpoint error types.

use thiserror::Error;

/// Errors from account and session calls.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client could not be built from its configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using EndpointError.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Outcome classes of a failed record upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    /// The endpoint already holds a record with this id
    #[error("Record already exists on the endpoint")]
    Conflict,

    /// The endpoint rejected the record's structure
    #[error("Record rejected as invalid")]
    InvalidRecord,

    /// The auth token was refused
    #[error("Auth token rejected")]
    InvalidToken,

    /// Anything else: network failure, server error, unexpected status
    #[error("Upload failed: {0}")]
    Other(String),
}

impl PostError {
    /// Permanent failures are discarded; retrying would fail the same way.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PostError::Conflict | PostError::InvalidRecord)
    }
}
