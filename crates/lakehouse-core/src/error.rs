//! Error Types for Core Operations
//!
//! ## Error Categories
//!
//! ### Codec Errors
//! - `Compression` / `Decompression`: byte-level codec failures (the latter
//!   usually means corruption)
//! - `InvalidCompression`: unknown compression type ID
//!
//! ### Encryption Errors
//! - `Encryption` / `Decryption`: AES-GCM failures; a decryption failure
//!   means a wrong key or tampered ciphertext
//! - `InvalidKey`: encryption key is not 32 bytes of hex
//!
//! ### Model Errors
//! - `InvalidSchema`: schema violates its own invariants (e.g. a partition
//!   key that is not a declared field)
//! - `InvalidLayerTransition`: attempt to move a partition backwards in the
//!   raw -> cleaned -> curated pipeline
//!
//! All fallible functions in this crate return `Result<T>`, aliased to
//! `Result<T, Error>`, so callers propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(u16),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Invalid schema '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("Invalid layer transition: {from} -> {to}")]
    InvalidLayerTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
