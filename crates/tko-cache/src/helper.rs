//! Compression layer over [`CacheEngine`].
//!
//! Values are compressed on the way in and decompressed on the way out. A
//! payload that fails to decode is reported as a miss, never as an error.

use crate::compression::{self, CompressionAlgorithm};
use crate::engine::CacheEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tko_core::Result;

/// Content fingerprint for cache keys: blake3 over length-prefixed parts.
///
/// Length prefixes keep `["ab", "c"]` and `["a", "bc"]` distinct.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Clone)]
pub struct CacheHelper {
    engine: Arc<CacheEngine>,
    algorithm: CompressionAlgorithm,
}

impl CacheHelper {
    pub fn new(engine: Arc<CacheEngine>, algorithm: CompressionAlgorithm) -> Self {
        Self { engine, algorithm }
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn set_bytes(&self, key: &str, data: &[u8]) -> Result<()> {
        self.set_bytes_with_ttl(key, data, self.engine.limits().default_ttl)
    }

    pub fn set_bytes_with_ttl(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> Result<()> {
        let packed = compression::compress(data, self.algorithm)?;
        self.engine.set_with_ttl(
            key,
            &packed.data,
            packed.original_size as u64,
            packed.compressed_size as u64,
            ttl,
        )
    }

    /// Decompressed bytes, or `None` on a miss or an undecodable payload.
    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(stored) = self.engine.get(key)? else {
            return Ok(None);
        };
        match compression::decompress(&stored, self.algorithm) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                tracing::warn!(key, algorithm = %self.algorithm, error = %e, "cached payload failed to decompress, treating as miss");
                Ok(None)
            }
        }
    }

    pub fn set_text(&self, key: &str, text: &str) -> Result<()> {
        self.set_bytes(key, text.as_bytes())
    }

    pub fn set_text_with_ttl(&self, key: &str, text: &str, ttl: Option<Duration>) -> Result<()> {
        self.set_bytes_with_ttl(key, text.as_bytes(), ttl)
    }

    pub fn get_text(&self, key: &str) -> Result<Option<String>> {
        let Some(data) = self.get_bytes(key)? else {
            return Ok(None);
        };
        match String::from_utf8(data) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached payload is not UTF-8, treating as miss");
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.set_bytes(key, &data)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(data) = self.get_bytes(key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached JSON failed to parse, treating as miss");
                Ok(None)
            }
        }
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.engine.delete(key)
    }
}
