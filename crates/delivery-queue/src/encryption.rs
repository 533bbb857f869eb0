//! Encryption at rest for queue entries.

use crate::{QueueError, QueueResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Transforms entry bytes on their way to and from disk.
pub trait QueueEncryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> QueueResult<Vec<u8>>;

    fn decrypt(&self, stored: &[u8]) -> QueueResult<Vec<u8>>;
}

/// Stores entries as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearEncryptor;

impl QueueEncryptor for ClearEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> QueueResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, stored: &[u8]) -> QueueResult<Vec<u8>> {
        Ok(stored.to_vec())
    }
}

/// ChaCha20-Poly1305 with a random nonce per entry.
///
/// Stored layout is `nonce || ciphertext || tag`.
pub struct ChaChaEncryptor {
    cipher: ChaCha20Poly1305,
}

impl ChaChaEncryptor {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// Derive the queue key from an application secret with HKDF-SHA256.
    pub fn from_secret(secret: &[u8], info: &[u8]) -> QueueResult<Self> {
        let hkdf = Hkdf::<Sha256>::new(None, secret);
        let mut okm = [0u8; KEY_SIZE];
        hkdf.expand(info, &mut okm)
            .map_err(|e| QueueError::Encryption(format!("HKDF expand failed: {:?}", e)))?;
        Ok(Self::new(okm))
    }

    /// Generate a random encryption key.
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

impl QueueEncryptor for ChaChaEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> QueueResult<Vec<u8>> {
        let nonce = generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| QueueError::Encryption(e.to_string()))?;

        let mut stored = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&ciphertext);
        Ok(stored)
    }

    fn decrypt(&self, stored: &[u8]) -> QueueResult<Vec<u8>> {
        if stored.len() < NONCE_SIZE {
            return Err(QueueError::Encryption(format!(
                "Entry too short: expected at least {} bytes, got {}",
                NONCE_SIZE,
                stored.len()
            )));
        }
        let (nonce, ciphertext) = stored.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| QueueError::Encryption(e.to_string()))
    }
}
