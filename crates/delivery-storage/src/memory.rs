//! In-memory secure storage.

use crate::{SecureStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Process-local storage backend.
///
/// Keys can be marked as failing to simulate a keychain that rejects writes.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, Vec<u8>>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` of `key` fail with a platform error.
    pub fn fail_writes_for(&self, key: &str) {
        self.failing_writes.lock().insert(key.to_string());
    }

    /// Undo [`MemoryStorage::fail_writes_for`].
    pub fn allow_writes_for(&self, key: &str) {
        self.failing_writes.lock().remove(key);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if self.failing_writes.lock().contains(key) {
            return Err(StorageError::Platform(format!("write rejected for {key}")));
        }
        self.data.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}
