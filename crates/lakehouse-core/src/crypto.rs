//! Field-Level Encryption
//!
//! Symmetric encryption for PII column values, applied in place by the
//! `standardize` transformation when a schema declares
//! `encryption_required`.
//!
//! ## Format
//!
//! Encrypted values are self-describing strings:
//!
//! ```text
//! enc:<hex(nonce || ciphertext)>
//! ```
//!
//! - AES-256-GCM with a fresh random 96-bit nonce per value
//! - The `enc:` prefix makes encryption idempotent: re-running standardize
//!   over an already-encrypted column is a no-op, and decryption passes
//!   plaintext values through untouched (data written before the schema
//!   required encryption)
//!
//! The key is deployment configuration (32 bytes, hex-encoded). Losing it
//! makes PII columns unrecoverable, which is the point.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};

use crate::error::{Error, Result};

const ENC_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;

/// AES-256-GCM codec over individual field values.
#[derive(Clone)]
pub struct EncryptionCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("EncryptionCodec").finish_non_exhaustive()
    }
}

impl EncryptionCodec {
    /// Build a codec from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        if key_bytes.len() != 32 {
            return Err(Error::InvalidKey(format!(
                "expected 32 key bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Build a codec from a 64-char hex key string (the configuration form).
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| Error::InvalidKey(format!("key is not valid hex: {}", e)))?;
        Self::new(&bytes)
    }

    /// Whether a value is already in the encrypted format.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENC_PREFIX)
    }

    /// Encrypt one field value. Already-encrypted values are returned as-is.
    pub fn encrypt_value(&self, plaintext: &str) -> Result<String> {
        if Self::is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", ENC_PREFIX, hex::encode(combined)))
    }

    /// Decrypt one field value. Values without the `enc:` prefix pass
    /// through untouched.
    pub fn decrypt_value(&self, value: &str) -> Result<String> {
        let Some(encoded) = value.strip_prefix(ENC_PREFIX) else {
            return Ok(value.to_string());
        };
        let combined = hex::decode(encoded)
            .map_err(|e| Error::Decryption(format!("invalid hex payload: {}", e)))?;
        if combined.len() < NONCE_LEN {
            return Err(Error::Decryption("payload shorter than nonce".to_string()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Decryption(e.to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> EncryptionCodec {
        EncryptionCodec::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let encrypted = codec.encrypt_value("alice@example.com").unwrap();
        assert!(EncryptionCodec::is_encrypted(&encrypted));
        assert_ne!(encrypted, "alice@example.com");
        assert_eq!(codec.decrypt_value(&encrypted).unwrap(), "alice@example.com");
    }

    #[test]
    fn test_encrypt_is_idempotent() {
        let codec = codec();
        let once = codec.encrypt_value("secret").unwrap();
        let twice = codec.encrypt_value(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_plaintext_passes_through_decrypt() {
        assert_eq!(codec().decrypt_value("plain").unwrap(), "plain");
    }

    #[test]
    fn test_nonces_are_unique() {
        let codec = codec();
        let a = codec.encrypt_value("same").unwrap();
        let b = codec.encrypt_value("same").unwrap();
        // Distinct ciphertexts for identical plaintext
        assert_ne!(a, b);
        assert_eq!(codec.decrypt_value(&a).unwrap(), codec.decrypt_value(&b).unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = codec().encrypt_value("secret").unwrap();
        let other = EncryptionCodec::new(&[9u8; 32]).unwrap();
        assert!(other.decrypt_value(&encrypted).is_err());
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(EncryptionCodec::new(&[0u8; 16]).is_err());
        assert!(EncryptionCodec::from_hex_key("deadbeef").is_err());
        let hex_key = "00".repeat(32);
        assert!(EncryptionCodec::from_hex_key(&hex_key).is_ok());
    }
}
