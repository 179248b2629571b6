//! SQLite-backed cache engine.
//!
//! Keys are opaque strings, payloads opaque bytes. Size bookkeeping is
//! supplied by the caller and only feeds stats and eviction. Eviction is LRU
//! by a monotonically increasing access sequence and runs lazily on `set`.
//!
//! One engine instance should own a given database file. Several instances on
//! the same file are serialized by SQLite transactions only.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tko_core::time::now_millis;
use tko_core::{CacheConfig, Result, TkoError};
use tko_tokens::calculate_cache_hit_rate;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        key              TEXT PRIMARY KEY,
        payload          BLOB NOT NULL,
        original_size    INTEGER NOT NULL,
        compressed_size  INTEGER NOT NULL,
        created_at       INTEGER NOT NULL,
        last_accessed_at INTEGER NOT NULL,
        access_seq       INTEGER NOT NULL,
        expires_at       INTEGER,
        hit_count        INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_cache_access_seq ON cache_entries(access_seq);
    CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache_entries(expires_at);
";

fn storage_err(context: &str, e: rusqlite::Error) -> TkoError {
    TkoError::Storage(format!("{context}: {e}"))
}

/// Capacity budget and default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_size_bytes: u64,
    pub default_ttl: Option<Duration>,
}

impl Default for CacheLimits {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::from(&config)
    }
}

impl From<&CacheConfig> for CacheLimits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_size_bytes: config.max_size_bytes,
            default_ttl: config.default_ttl_secs.map(Duration::from_secs),
        }
    }
}

/// A stored entry with its bookkeeping. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub expires_at: Option<i64>,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|t| t <= now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Percent of lookups that hit.
    pub hit_rate: f64,
    /// compressed / original over all entries; 1.0 when empty.
    pub compression_ratio: f64,
}

pub struct CacheEngine {
    conn: Mutex<Option<Connection>>,
    limits: CacheLimits,
    path: Option<PathBuf>,
    access_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheEngine {
    /// Open (or create) a cache database. Fails immediately if the file
    /// cannot be opened.
    pub fn open(path: &Path, limits: CacheLimits) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| storage_err("open cache", e))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| storage_err("cache pragmas", e))?;
        let engine = Self::init(conn, limits, Some(path.to_path_buf()))?;
        let entries = engine.len()?;
        tracing::info!(path = %path.display(), entries, "cache opened");
        Ok(engine)
    }

    pub fn open_in_memory(limits: CacheLimits) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| storage_err("open cache", e))?;
        Self::init(conn, limits, None)
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let limits = CacheLimits::from(config);
        match config.path {
            Some(ref path) => Self::open(path, limits),
            None => Self::open_in_memory(limits),
        }
    }

    fn init(conn: Connection, limits: CacheLimits, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| storage_err("cache schema", e))?;
        let seq: i64 = conn
            .query_row("SELECT COALESCE(MAX(access_seq), 0) FROM cache_entries", [], |r| r.get(0))
            .map_err(|e| storage_err("cache access_seq", e))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            limits,
            path,
            access_seq: AtomicU64::new(seq as u64),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(TkoError::Closed("cache engine"))?;
        f(conn)
    }

    fn next_seq(&self) -> i64 {
        (self.access_seq.fetch_add(1, Ordering::Relaxed) + 1) as i64
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Payload for `key`, or `None` if it is unknown or expired. A hit
    /// refreshes the entry's LRU position.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        self.with_conn(|conn| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT payload, expires_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(|e| storage_err("cache get", e))?;

            match row {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    Ok(None)
                }
                Some((_, Some(expires_at))) if expires_at <= now => {
                    conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                        .map_err(|e| storage_err("cache expire", e))?;
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key, "cache entry expired");
                    Ok(None)
                }
                Some((payload, _)) => {
                    conn.execute(
                        "UPDATE cache_entries
                         SET last_accessed_at = ?2, access_seq = ?3, hit_count = hit_count + 1
                         WHERE key = ?1",
                        params![key, now, self.next_seq()],
                    )
                    .map_err(|e| storage_err("cache touch", e))?;
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(payload))
                }
            }
        })
    }

    /// Entry with bookkeeping, without touching LRU order or hit counters.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = now_millis();
        let entry = self.with_conn(|conn| {
            conn.query_row(
                "SELECT key, payload, original_size, compressed_size, created_at,
                        last_accessed_at, expires_at, hit_count
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |r| {
                    Ok(CacheEntry {
                        key: r.get(0)?,
                        payload: r.get(1)?,
                        original_size: r.get::<_, i64>(2)? as u64,
                        compressed_size: r.get::<_, i64>(3)? as u64,
                        created_at: r.get(4)?,
                        last_accessed_at: r.get(5)?,
                        expires_at: r.get(6)?,
                        hit_count: r.get::<_, i64>(7)? as u64,
                    })
                },
            )
            .optional()
            .map_err(|e| storage_err("cache get_entry", e))
        })?;
        Ok(entry.filter(|e| !e.is_expired(now)))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_entry(key)?.is_some())
    }

    /// Store `payload` under `key`, overwriting any previous entry. The
    /// configured default TTL applies.
    pub fn set(&self, key: &str, payload: &[u8], original_size: u64, compressed_size: u64) -> Result<()> {
        self.set_with_ttl(key, payload, original_size, compressed_size, self.limits.default_ttl)
    }

    pub fn set_with_ttl(
        &self,
        key: &str,
        payload: &[u8],
        original_size: u64,
        compressed_size: u64,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = now_millis();
        let expires_at = ttl.map(|d| now.saturating_add(d.as_millis() as i64));
        let seq = self.next_seq();
        let evicted = self.with_conn(|conn| {
            let tx = conn.transaction().map_err(|e| storage_err("cache set begin", e))?;
            tx.execute(
                "INSERT INTO cache_entries (
                    key, payload, original_size, compressed_size, created_at,
                    last_accessed_at, access_seq, expires_at, hit_count
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, 0)
                 ON CONFLICT(key) DO UPDATE SET
                    payload = excluded.payload,
                    original_size = excluded.original_size,
                    compressed_size = excluded.compressed_size,
                    created_at = excluded.created_at,
                    last_accessed_at = excluded.last_accessed_at,
                    access_seq = excluded.access_seq,
                    expires_at = excluded.expires_at,
                    hit_count = 0",
                params![key, payload, original_size as i64, compressed_size as i64, now, seq, expires_at],
            )
            .map_err(|e| storage_err("cache set", e))?;
            let evicted = evict_lru(&tx, key, &self.limits)?;
            tx.commit().map_err(|e| storage_err("cache set commit", e))?;
            Ok(evicted)
        })?;
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "cache evicted least-recently-used entries");
        }
        Ok(())
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .map_err(|e| storage_err("cache delete", e))?;
            Ok(n > 0)
        })
    }

    pub fn clear(&self) -> Result<usize> {
        let removed = self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries", [])
                .map_err(|e| storage_err("cache clear", e))
        })?;
        tracing::info!(removed, "cache cleared");
        Ok(removed)
    }

    /// Drop every expired entry and return how many were removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let now = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
            .map_err(|e| storage_err("cache cleanup", e))
        })
    }

    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))
                .map_err(|e| storage_err("cache len", e))?;
            Ok(n as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let (entries, original, compressed) = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(original_size), 0), COALESCE(SUM(compressed_size), 0)
                 FROM cache_entries",
                [],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)),
            )
            .map_err(|e| storage_err("cache stats", e))
        })?;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        Ok(CacheStats {
            total_entries: entries as u64,
            total_original_size: original as u64,
            total_compressed_size: compressed as u64,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: calculate_cache_hit_rate(hits, misses),
            compression_ratio: if original > 0 { compressed as f64 / original as f64 } else { 1.0 },
        })
    }

    /// Checkpoint and release the database. Later calls fail with
    /// `TkoError::Closed`; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        if self.path.is_some() {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                .map_err(|e| storage_err("cache checkpoint", e))?;
        }
        conn.close().map_err(|(_, e)| storage_err("cache close", e))?;
        tracing::info!("cache closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

/// Delete least-recently-accessed entries (never `keep`) until both budgets
/// hold. Returns the number of evicted entries.
fn evict_lru(conn: &Connection, keep: &str, limits: &CacheLimits) -> Result<usize> {
    let (count, size): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(compressed_size), 0) FROM cache_entries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(|e| storage_err("cache usage", e))?;
    let mut count = count as u64;
    let mut size = size as u64;
    let max_entries = limits.max_entries as u64;
    if count <= max_entries && size <= limits.max_size_bytes {
        return Ok(0);
    }

    let mut victims = Vec::new();
    {
        let mut stmt = conn
            .prepare("SELECT key, compressed_size FROM cache_entries WHERE key != ?1 ORDER BY access_seq ASC")
            .map_err(|e| storage_err("cache evict scan", e))?;
        let mut rows = stmt.query(params![keep]).map_err(|e| storage_err("cache evict scan", e))?;
        while count > max_entries || size > limits.max_size_bytes {
            let Some(row) = rows.next().map_err(|e| storage_err("cache evict scan", e))? else {
                break;
            };
            let key: String = row.get(0).map_err(|e| storage_err("cache evict row", e))?;
            let entry_size: i64 = row.get(1).map_err(|e| storage_err("cache evict row", e))?;
            count -= 1;
            size = size.saturating_sub(entry_size as u64);
            victims.push(key);
        }
    }

    for key in &victims {
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| storage_err("cache evict", e))?;
    }
    Ok(victims.len())
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "cache close on drop failed");
        }
    }
}
