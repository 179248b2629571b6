//! Persistent cache for computed artifacts.
//!
//! - [`compression`]: payload compression adapter (identity, zstd)
//! - [`engine`]: SQLite-backed key-value store with LRU/TTL eviction
//! - [`helper`]: compress-on-set / decompress-on-get layer and key fingerprints

pub mod compression;
pub mod engine;
pub mod helper;

pub use compression::{compress, decompress, CompressedPayload, CompressionAlgorithm};
pub use engine::{CacheEngine, CacheEntry, CacheLimits, CacheStats};
pub use helper::{fingerprint, CacheHelper};
