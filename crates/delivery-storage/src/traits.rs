//! Storage trait definitions.

use crate::{StorageError, StorageResult};

/// Trait for secure storage backends.
///
/// Values are opaque bytes; callers decide on the encoding.
pub trait SecureStorage: Send + Sync {
    /// Store a value securely, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a value. Returns whether something was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Store a UTF-8 string.
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set(key, value.as_bytes())
    }

    /// Retrieve a value as a UTF-8 string.
    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Encoding(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }
}
