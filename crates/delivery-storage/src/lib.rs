//! Secure credential storage abstraction for the delivery service.
//!
//! Platform keychains live outside this workspace; embedders hand the
//! delivery manager any [`SecureStorage`] implementation. [`MemoryStorage`]
//! is provided for tests and for hosts without a keychain.

mod keys;
mod memory;
mod traits;

pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
