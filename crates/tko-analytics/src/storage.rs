//! Durable analytics log with write batching.
//!
//! `save` only enqueues. The queue is written in one transaction when it
//! reaches `batch_size`, or by a single delayed flush task scheduled on the
//! first enqueue of a window. Every read flushes first, so a reader always
//! sees its own writes. `close` (and dropping the last handle) cancels the
//! timer and performs a final flush.
//!
//! The storage assumes it is the only writer of its database file.

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tko_core::{
    AnalyticsConfig, AnalyticsEntry, AnalyticsFilter, EntryMetadata, HookPhase, Result, TkoError,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS analytics (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        hook_phase       TEXT NOT NULL,
        tool_name        TEXT NOT NULL,
        mcp_server       TEXT NOT NULL,
        original_tokens  INTEGER NOT NULL,
        optimized_tokens INTEGER NOT NULL,
        tokens_saved     INTEGER NOT NULL,
        timestamp        TEXT NOT NULL,
        session_id       TEXT,
        metadata         TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_analytics_hook_phase ON analytics(hook_phase);
    CREATE INDEX IF NOT EXISTS idx_analytics_tool_name ON analytics(tool_name);
    CREATE INDEX IF NOT EXISTS idx_analytics_mcp_server ON analytics(mcp_server);
    CREATE INDEX IF NOT EXISTS idx_analytics_session_id ON analytics(session_id);
    CREATE INDEX IF NOT EXISTS idx_analytics_timestamp ON analytics(timestamp);
";

const SELECT_COLUMNS: &str = "SELECT hook_phase, tool_name, mcp_server, original_tokens, \
     optimized_tokens, tokens_saved, timestamp, session_id, metadata FROM analytics";

fn storage_err(context: &str, e: rusqlite::Error) -> TkoError {
    TkoError::Storage(format!("{context}: {e}"))
}

struct StorageInner {
    conn: Mutex<Option<Connection>>,
    queue: Mutex<Vec<AnalyticsEntry>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    batch_size: usize,
    flush_delay: Duration,
}

impl StorageInner {
    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// Write every queued entry. The connection lock serializes flushes.
    fn flush(&self) -> Result<usize> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(TkoError::Closed("analytics storage"))?;
        self.drain_into(conn)
    }

    fn drain_into(&self, conn: &mut Connection) -> Result<usize> {
        let batch = std::mem::take(&mut *self.queue.lock());
        if batch.is_empty() {
            return Ok(0);
        }
        match insert_entries(conn, &batch) {
            Ok(()) => {
                tracing::debug!(count = batch.len(), "flushed analytics batch");
                Ok(batch.len())
            }
            Err(e) => {
                // Put the batch back ahead of anything queued meanwhile.
                let mut queue = self.queue.lock();
                let newer = std::mem::replace(&mut *queue, batch);
                queue.extend(newer);
                Err(e)
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.cancel_timer();
        let mut guard = self.conn.lock();
        let Some(mut conn) = guard.take() else {
            return Ok(());
        };
        if let Err(e) = self.drain_into(&mut conn) {
            *guard = Some(conn);
            return Err(e);
        }
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            tracing::debug!(error = %e, "analytics checkpoint skipped");
        }
        conn.close().map_err(|(_, e)| storage_err("analytics close", e))?;
        tracing::info!("analytics storage closed");
        Ok(())
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, pending = self.queue.lock().len(), "analytics final flush failed");
        }
    }
}

pub struct AnalyticsStorage {
    inner: Arc<StorageInner>,
    path: Option<PathBuf>,
}

impl AnalyticsStorage {
    /// Open (or create) the analytics database at `path`. Fails immediately
    /// if the file cannot be opened.
    pub fn open(path: &Path, config: &AnalyticsConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| storage_err("open analytics", e))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| storage_err("analytics pragmas", e))?;
        let storage = Self::init(conn, config, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "analytics storage opened");
        Ok(storage)
    }

    pub fn open_in_memory(config: &AnalyticsConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| storage_err("open analytics", e))?;
        Self::init(conn, config, None)
    }

    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        match config.path {
            Some(ref path) => Self::open(path, config),
            None => Self::open_in_memory(config),
        }
    }

    fn init(conn: Connection, config: &AnalyticsConfig, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| storage_err("analytics schema", e))?;
        Ok(Self {
            inner: Arc::new(StorageInner {
                conn: Mutex::new(Some(conn)),
                queue: Mutex::new(Vec::new()),
                timer: Mutex::new(None),
                batch_size: config.batch_size.max(1),
                flush_delay: Duration::from_millis(config.flush_delay_ms),
            }),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn flush_delay(&self) -> Duration {
        self.inner.flush_delay
    }

    /// Number of entries waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.conn.lock().is_none()
    }

    /// Enqueue one entry. Flushes right away once the queue reaches the
    /// batch size, otherwise makes sure a delayed flush is pending.
    pub async fn save(&self, entry: AnalyticsEntry) -> Result<()> {
        if self.is_closed() {
            return Err(TkoError::Closed("analytics storage"));
        }
        let full = {
            let mut queue = self.inner.queue.lock();
            queue.push(entry);
            queue.len() >= self.inner.batch_size
        };
        if full {
            self.inner.cancel_timer();
            self.inner.flush()?;
        } else {
            self.schedule_flush();
        }
        Ok(())
    }

    fn schedule_flush(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak: Weak<StorageInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.flush_delay;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.timer.lock().take();
            match inner.flush() {
                Ok(_) => {}
                Err(TkoError::Closed(_)) => {}
                Err(e) => tracing::warn!(error = %e, "delayed analytics flush failed"),
            }
        }));
    }

    /// Write `entries` in one transaction: either all of them become visible
    /// or none do. Entries already queued are written first.
    pub async fn save_batch(&self, entries: Vec<AnalyticsEntry>) -> Result<()> {
        let mut guard = self.inner.conn.lock();
        let conn = guard.as_mut().ok_or(TkoError::Closed("analytics storage"))?;
        self.inner.drain_into(conn)?;
        if entries.is_empty() {
            return Ok(());
        }
        insert_entries(conn, &entries)?;
        tracing::debug!(count = entries.len(), "saved analytics batch");
        Ok(())
    }

    /// Persist everything queued. Returns the number of entries written.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.cancel_timer();
        self.inner.flush()
    }

    /// Entries matching every set field of `filter`, oldest first.
    pub async fn query(&self, filter: Option<&AnalyticsFilter>) -> Result<Vec<AnalyticsEntry>> {
        let (clause, values) = where_clause(filter.cloned().unwrap_or_default());
        self.select(&clause, values)
    }

    /// Entries with `start <= timestamp <= end` (ISO-8601 string order).
    pub async fn query_by_date_range(&self, start: &str, end: &str) -> Result<Vec<AnalyticsEntry>> {
        self.select(
            " WHERE timestamp >= ? AND timestamp <= ?",
            vec![start.to_string(), end.to_string()],
        )
    }

    pub async fn count(&self) -> Result<usize> {
        let mut guard = self.inner.conn.lock();
        let conn = guard.as_mut().ok_or(TkoError::Closed("analytics storage"))?;
        self.inner.drain_into(conn)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM analytics", [], |r| r.get(0))
            .map_err(|e| storage_err("analytics count", e))?;
        Ok(n as usize)
    }

    /// Flush, then delete every stored entry. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        self.inner.cancel_timer();
        let mut guard = self.inner.conn.lock();
        let conn = guard.as_mut().ok_or(TkoError::Closed("analytics storage"))?;
        self.inner.drain_into(conn)?;
        let removed = conn
            .execute("DELETE FROM analytics", [])
            .map_err(|e| storage_err("analytics clear", e))?;
        tracing::info!(removed, "analytics cleared");
        Ok(removed)
    }

    /// Cancel the pending flush, write the queue and release the database.
    pub async fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn select(&self, clause: &str, values: Vec<String>) -> Result<Vec<AnalyticsEntry>> {
        let mut guard = self.inner.conn.lock();
        let conn = guard.as_mut().ok_or(TkoError::Closed("analytics storage"))?;
        self.inner.drain_into(conn)?;
        let sql = format!("{SELECT_COLUMNS}{clause} ORDER BY timestamp ASC, id ASC");
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| storage_err("analytics query", e))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_entry)
            .map_err(|e| storage_err("analytics query", e))?;
        let entries = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_err("analytics row", e))?;
        Ok(entries)
    }
}

fn insert_entries(conn: &mut Connection, entries: &[AnalyticsEntry]) -> Result<()> {
    let tx = conn.transaction().map_err(|e| storage_err("analytics begin", e))?;
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO analytics (
                    hook_phase, tool_name, mcp_server, original_tokens, optimized_tokens,
                    tokens_saved, timestamp, session_id, metadata
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(|e| storage_err("analytics insert", e))?;
        for e in entries {
            stmt.execute(params![
                e.hook_phase.as_str(),
                e.tool_name,
                e.mcp_server,
                e.original_tokens as i64,
                e.optimized_tokens as i64,
                e.tokens_saved,
                e.timestamp,
                e.session_id,
                e.metadata.as_ref().map(EntryMetadata::to_json_string),
            ])
            .map_err(|err| storage_err("analytics insert", err))?;
        }
    }
    tx.commit().map_err(|e| storage_err("analytics commit", e))
}

fn where_clause(filter: AnalyticsFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(phase) = filter.hook_phase {
        clauses.push("hook_phase = ?");
        values.push(phase.as_str().to_string());
    }
    if let Some(tool) = filter.tool_name {
        clauses.push("tool_name = ?");
        values.push(tool);
    }
    if let Some(server) = filter.mcp_server {
        clauses.push("mcp_server = ?");
        values.push(server);
    }
    if let Some(session) = filter.session_id {
        clauses.push("session_id = ?");
        values.push(session);
    }
    if let Some(start) = filter.start_date {
        clauses.push("timestamp >= ?");
        values.push(start);
    }
    if let Some(end) = filter.end_date {
        clauses.push("timestamp <= ?");
        values.push(end);
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AnalyticsEntry> {
    let phase: String = row.get(0)?;
    let hook_phase = phase.parse::<HookPhase>().unwrap_or_else(|_| {
        tracing::warn!(phase = %phase, "unknown hook phase in analytics row");
        HookPhase::Unknown
    });
    let metadata: Option<String> = row.get(8)?;
    Ok(AnalyticsEntry {
        hook_phase,
        tool_name: row.get(1)?,
        mcp_server: row.get(2)?,
        original_tokens: row.get::<_, i64>(3)? as u64,
        optimized_tokens: row.get::<_, i64>(4)? as u64,
        tokens_saved: row.get(5)?,
        timestamp: row.get(6)?,
        session_id: row.get(7)?,
        metadata: metadata.as_deref().and_then(EntryMetadata::parse),
    })
}
