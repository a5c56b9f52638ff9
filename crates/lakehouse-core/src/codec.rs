//! Compression Codec
//!
//! Byte-level compression for stored partition payloads.
//!
//! ## Supported Algorithms
//!
//! - **None**: pass-through (useful for tiny payloads and debugging)
//! - **LZ4**: fast with a good ratio; the default for the ingest path
//! - **Zstd**: better ratio, slower; the usual pick for archive-bound data
//!
//! LZ4 uses the size-prepended block format so decompression never needs an
//! out-of-band length. Zstd uses level 3.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compression algorithm for partition payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum Compression {
    None = 0,
    Lz4 = 1,
    Zstd = 2,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Compression::None),
            "lz4" => Some(Compression::Lz4),
            "zstd" => Some(Compression::Zstd),
            _ => None,
        }
    }
}

impl TryFrom<u16> for Compression {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            2 => Ok(Compression::Zstd),
            _ => Err(Error::InvalidCompression(value)),
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compress `data` with the given algorithm.
pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        Compression::Zstd => {
            zstd::encode_all(data, 3).map_err(|e| Error::Compression(e.to_string()))
        }
    }
}

/// Decompress `data`. A failure here almost always means corruption (or the
/// wrong algorithm recorded in metadata).
pub fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Decompression(e.to_string())),
        Compression::Zstd => {
            zstd::decode_all(data).map_err(|e| Error::Decompression(e.to_string()))
        }
    }
}
