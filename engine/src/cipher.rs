//! Content encryption for mirrored files.
//!
//! Blobs are `IV || ciphertext`: a fresh 16-byte IV followed by the payload
//! under AES-256 in full-block CFB mode. The IV travels with the blob, so any
//! AES-256-CFB implementation holding the key can reverse it.

use crate::error::EngineError;
use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::path::Path;
use zeroize::Zeroize;

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;

/// AES block size, and therefore the IV size, in bytes.
pub const BLOCK_LEN: usize = 16;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;

/// A 256-bit cipher key, wiped from memory on drop.
pub struct CipherKey {
    key: [u8; KEY_LEN],
}

impl CipherKey {
    /// Build a key from raw bytes. The slice must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| EngineError::InvalidKeyLength {
                expected: KEY_LEN,
                got: bytes.len(),
            })?;
        Ok(Self { key })
    }

    /// Parse a key from 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, EngineError> {
        let mut bytes = hex::decode(text.trim()).map_err(|e| EngineError::KeyUnavailable {
            reason: format!("key is not valid hex: {e}"),
        })?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Load a key file holding either 32 raw bytes or 64 hex characters.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let mut contents = std::fs::read(path).map_err(|e| EngineError::KeyUnavailable {
            reason: format!("cannot read key file {}: {e}", path.display()),
        })?;

        let key = if contents.len() == KEY_LEN {
            Self::from_bytes(&contents)
        } else {
            match std::str::from_utf8(&contents) {
                Ok(text) => Self::from_hex(text),
                Err(_) => Err(EngineError::InvalidKeyLength {
                    expected: KEY_LEN,
                    got: contents.len(),
                }),
            }
        };
        contents.zeroize();
        key
    }

    /// Key bytes for cryptographic operations
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(<redacted>)")
    }
}

/// Encrypt `plaintext` into a self-describing blob.
///
/// A new IV is drawn from the OS random source on every call; IV reuse under
/// one key would leak the XOR of the plaintexts.
///
/// # Errors
/// - `InvalidKeyLength` if `key` is not 32 bytes
/// - `RandomUnavailable` if the OS cannot supply random bytes
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, EngineError> {
    if key.len() != KEY_LEN {
        return Err(EngineError::InvalidKeyLength {
            expected: KEY_LEN,
            got: key.len(),
        });
    }

    let mut blob = vec![0u8; BLOCK_LEN + plaintext.len()];
    let (iv, payload) = blob.split_at_mut(BLOCK_LEN);

    OsRng
        .try_fill_bytes(iv)
        .map_err(|e| EngineError::RandomUnavailable {
            reason: e.to_string(),
        })?;

    payload.copy_from_slice(plaintext);
    let encryptor =
        Aes256CfbEnc::new_from_slices(key, iv).map_err(|_| EngineError::InvalidKeyLength {
            expected: KEY_LEN,
            got: key.len(),
        })?;
    encryptor.encrypt(payload);

    Ok(blob)
}
