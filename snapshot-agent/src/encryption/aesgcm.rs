//! AES-256-GCM transformer.
//!
//! # Format
//!
//! ```text
//! [Magic: 1 byte (0xE0)] [Version: 1 byte] [Nonce: 12 bytes] [Ciphertext + Tag: N bytes]
//! ```
//!
//! The additional authenticated data is not stored; the reader must supply
//! the same value (the object name) or decryption fails.

use super::Transformer;
use crate::utils::errors::BoxError;
use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};

const ENCRYPTION_MAGIC: u8 = 0xE0;
const ENCRYPTION_VERSION: u8 = 0x01;

/// Header size: magic (1) + version (1) + nonce (12)
const HEADER_SIZE: usize = 14;
const NONCE_SIZE: usize = 12;

pub const KEY_SIZE: usize = 32;

pub struct AesGcmTransformer {
    cipher: Aes256Gcm,
    key_id: String,
}

impl AesGcmTransformer {
    pub fn new(key: &[u8; KEY_SIZE], key_id: impl Into<String>) -> Result<Self, BoxError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| format!("failed to initialize cipher: {}", e))?;
        Ok(Self {
            cipher,
            key_id: key_id.into(),
        })
    }

    /// Build from a 64-character hex key.
    pub fn from_hex(hex_key: &str, key_id: impl Into<String>) -> Result<Self, BoxError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| format!("invalid hex key: {}", e))?;
        let key: [u8; KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("key must be {} bytes, got {}", KEY_SIZE, bytes.len()))?;
        Self::new(&key, key_id)
    }

    /// Random key, for tests and first-time setup.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, BoxError> {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self::new(&key, key_id)
    }
}

impl std::fmt::Debug for AesGcmTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmTransformer")
            .field("key_id", &self.key_id)
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}

impl Transformer for AesGcmTransformer {
    fn transform_to_storage(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>, BoxError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: data, aad })
            .map_err(|e| format!("encryption failed: {}", e))?;

        let mut output = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        output.push(ENCRYPTION_MAGIC);
        output.push(ENCRYPTION_VERSION);
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn transform_from_storage(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>, BoxError> {
        if data.len() < HEADER_SIZE {
            return Err("data too short to be encrypted".into());
        }
        if data[0] != ENCRYPTION_MAGIC {
            return Err("invalid encryption header (not encrypted or corrupted)".into());
        }
        if data[1] != ENCRYPTION_VERSION {
            return Err(format!("unsupported encryption version: {}", data[1]).into());
        }

        let nonce = Nonce::from_slice(&data[2..HEADER_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &data[HEADER_SIZE..],
                    aad,
                },
            )
            .map_err(|e| format!("decryption failed (wrong key, identity or corrupted data): {}", e))?;
        Ok(plaintext)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
