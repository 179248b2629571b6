use crate::error::{Result, TkoError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DATA_DIR: &str = ".token-optimizer";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TkoConfig {
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite file backing the cache. `None` keeps the cache in memory.
    pub path: Option<PathBuf>,
    pub max_entries: usize,
    /// Budget over the sum of stored (compressed) payload sizes.
    pub max_size_bytes: u64,
    /// TTL applied by plain `set`; `None` means entries never expire.
    pub default_ttl_secs: Option<u64>,
    /// `zstd` or `none`.
    pub compression: String,
    pub compression_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// SQLite file backing the analytics log. `None` keeps it in memory.
    pub path: Option<PathBuf>,
    pub batch_size: usize,
    pub flush_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub encoding: String,
    pub cache_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_data_file("cache.db"),
            max_entries: 10_000,
            max_size_bytes: 100 * 1024 * 1024,
            default_ttl_secs: None,
            compression: "zstd".into(),
            compression_level: 3,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            path: default_data_file("analytics.db"),
            batch_size: 100,
            flush_delay_ms: 5_000,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            encoding: "cl100k_base".into(),
            cache_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    /// In-memory cache with default limits.
    pub fn in_memory() -> Self {
        Self { path: None, ..Self::default() }
    }
}

impl AnalyticsConfig {
    /// In-memory analytics log with default batching.
    pub fn in_memory() -> Self {
        Self { path: None, ..Self::default() }
    }
}

impl TkoConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| TkoError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TkoError::Config(format!("read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

fn default_data_file(name: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR).join(name))
}
