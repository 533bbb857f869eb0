//! Queue error types.

use thiserror::Error;

/// Error type for queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue holds no entries
    #[error("Queue is empty")]
    Empty,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk data failed validation
    #[error("Queue file corrupt: {0}")]
    Corrupt(String),

    /// Entry encryption or decryption failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    /// Everything except `Empty` means the backing storage misbehaved.
    pub fn is_storage_error(&self) -> bool {
        !matches!(self, QueueError::Empty)
    }
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_classification() {
        assert!(!QueueError::Empty.is_storage_error());
        assert!(QueueError::Corrupt("bad crc".into()).is_storage_error());
        assert!(QueueError::Encryption("tag".into()).is_storage_error());
        assert!(QueueError::Io(std::io::Error::other("disk")).is_storage_error());
    }
}
