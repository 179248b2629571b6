//! Compression adapter. Stateless; the engine stores whatever bytes it gets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tko_core::{Result, TkoError};

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "algorithm")]
pub enum CompressionAlgorithm {
    /// Store bytes as-is.
    None,
    Zstd { level: i32 },
}

impl CompressionAlgorithm {
    pub fn zstd() -> Self {
        Self::Zstd { level: DEFAULT_ZSTD_LEVEL }
    }

    /// Resolve the `compression` / `compression_level` pair from configuration.
    pub fn from_config(name: &str, level: i32) -> Result<Self> {
        match name.parse::<Self>()? {
            Self::Zstd { .. } => Ok(Self::Zstd { level }),
            other => Ok(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zstd { .. } => "zstd",
        }
    }
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::zstd()
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = TkoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "identity" => Ok(Self::None),
            "zstd" => Ok(Self::zstd()),
            other => Err(TkoError::Config(format!("unknown compression algorithm: {other}"))),
        }
    }
}

/// Compressed bytes plus size bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
}

impl CompressedPayload {
    /// compressed / original; 1.0 for empty input. May exceed 1.0 for tiny
    /// inputs.
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }
}

pub fn compress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<CompressedPayload> {
    let compressed = match algorithm {
        CompressionAlgorithm::None => data.to_vec(),
        CompressionAlgorithm::Zstd { level } => zstd::stream::encode_all(data, level)
            .map_err(|e| TkoError::Compression(format!("zstd encode: {e}")))?,
    };
    Ok(CompressedPayload {
        original_size: data.len(),
        compressed_size: compressed.len(),
        data: compressed,
    })
}

pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Zstd { .. } => zstd::stream::decode_all(data)
            .map_err(|e| TkoError::Compression(format!("zstd decode: {e}"))),
    }
}
