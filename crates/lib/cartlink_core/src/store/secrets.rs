//! At-rest encryption for stored refresh tokens.
//!
//! Column format: `enc:v1:` followed by base64 of `nonce(12) || ciphertext+tag`.
//! Values without the prefix predate encryption and are returned unchanged.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::StoreError;

/// Marker prepended to encrypted column values.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM cipher keyed by the SHA-256 of a passphrase.
#[derive(Clone)]
pub struct TokenCipher {
    aead: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            aead: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a refresh token into its column form.
    pub fn seal(&self, refresh_token: &str) -> Result<String, StoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let sealed = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), refresh_token.as_bytes())
            .map_err(|_| StoreError::Encryption("refresh token encryption failed".into()))?;

        let mut column = nonce.to_vec();
        column.extend_from_slice(&sealed);
        Ok(format!("{ENCRYPTED_PREFIX}{}", BASE64.encode(column)))
    }

    /// Decrypt a column value written by [`Self::seal`].
    pub fn open(&self, column: &str) -> Result<String, StoreError> {
        let Some(encoded) = column.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(column.to_string());
        };

        let raw = BASE64
            .decode(encoded)
            .map_err(|e| StoreError::Encryption(format!("stored token is not base64: {e}")))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(StoreError::Encryption("stored token is truncated".into()));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| StoreError::Encryption("stored token failed authentication".into()))?;
        String::from_utf8(plain)
            .map_err(|e| StoreError::Encryption(format!("stored token is not UTF-8: {e}")))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(<redacted>)")
    }
}
