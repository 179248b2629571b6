use std::time::Duration;
use tko_analytics::AnalyticsStorage;
use tko_core::{AnalyticsConfig, AnalyticsEntry, AnalyticsEvent, AnalyticsFilter, EntryMetadata, HookPhase, TkoError};

fn config(batch_size: usize, flush_delay_ms: u64) -> AnalyticsConfig {
    AnalyticsConfig { path: None, batch_size, flush_delay_ms }
}

fn entry(i: usize) -> AnalyticsEntry {
    AnalyticsEvent::new(HookPhase::PreToolUse, "Read", "fs", 100, 20)
        .stamp(format!("2026-01-01T00:00:{:02}.000Z", i % 60))
}

// ========== Batching ==========

#[tokio::test(start_paused = true)]
async fn test_threshold_flushes_immediately() {
    let storage = AnalyticsStorage::open_in_memory(&config(100, 5_000)).unwrap();
    for i in 0..99 {
        storage.save(entry(i)).await.unwrap();
    }
    assert_eq!(storage.pending(), 99);
    storage.save(entry(99)).await.unwrap();
    assert_eq!(storage.pending(), 0);
    assert_eq!(storage.count().await.unwrap(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_flush_after_window() {
    let storage = AnalyticsStorage::open_in_memory(&config(100, 5_000)).unwrap();
    for i in 0..99 {
        storage.save(entry(i)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(storage.pending(), 99);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(storage.pending(), 0);
    assert_eq!(storage.count().await.unwrap(), 99);
}

#[tokio::test(start_paused = true)]
async fn test_single_timer_per_window() {
    let storage = AnalyticsStorage::open_in_memory(&config(100, 5_000)).unwrap();
    storage.save(entry(0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    // A later save must not push the deadline back.
    storage.save(entry(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(storage.pending(), 0);

    // The next save opens a new window.
    storage.save(entry(2)).await.unwrap();
    assert_eq!(storage.pending(), 1);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(storage.pending(), 0);
    assert_eq!(storage.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_reads_see_queued_writes() {
    let storage = AnalyticsStorage::open_in_memory(&AnalyticsConfig::in_memory()).unwrap();
    storage.save(entry(0)).await.unwrap();
    assert_eq!(storage.pending(), 1);
    let rows = storage.query(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(storage.pending(), 0);
}

#[tokio::test]
async fn test_explicit_flush_reports_count() {
    let storage = AnalyticsStorage::open_in_memory(&AnalyticsConfig::in_memory()).unwrap();
    for i in 0..3 {
        storage.save(entry(i)).await.unwrap();
    }
    assert_eq!(storage.flush().await.unwrap(), 3);
    assert_eq!(storage.flush().await.unwrap(), 0);
}

#[tokio::test]
async fn test_save_batch_writes_all() {
    let storage = AnalyticsStorage::open_in_memory(&AnalyticsConfig::in_memory()).unwrap();
    storage.save(entry(0)).await.unwrap();
    storage.save_batch((1..6).map(entry).collect()).await.unwrap();
    assert_eq!(storage.pending(), 0);
    assert_eq!(storage.count().await.unwrap(), 6);
    storage.save_batch(Vec::new()).await.unwrap();
    assert_eq!(storage.count().await.unwrap(), 6);
}

// ========== Queries ==========

async fn seeded() -> AnalyticsStorage {
    let storage = AnalyticsStorage::open_in_memory(&AnalyticsConfig::in_memory()).unwrap();
    let rows = vec![
        AnalyticsEvent::new(HookPhase::PreToolUse, "Read", "fs", 100, 20)
            .with_session("s1")
            .stamp("2026-01-01T00:00:00.000Z"),
        AnalyticsEvent::new(HookPhase::PostToolUse, "Read", "fs", 50, 10)
            .with_session("s1")
            .stamp("2026-01-02T00:00:00.000Z"),
        AnalyticsEvent::new(HookPhase::PreToolUse, "Grep", "git", 30, 30)
            .with_session("s2")
            .stamp("2026-01-03T00:00:00.000Z"),
        AnalyticsEvent::new(HookPhase::PreToolUse, "Read", "git", 10, 5).stamp("2026-01-04T00:00:00.000Z"),
    ];
    storage.save_batch(rows).await.unwrap();
    storage
}

#[tokio::test]
async fn test_query_filters_are_conjunctive() {
    let storage = seeded().await;
    let f = AnalyticsFilter::new().hook_phase(HookPhase::PreToolUse).tool_name("Read");
    let rows = storage.query(Some(&f)).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.hook_phase == HookPhase::PreToolUse && r.tool_name == "Read"));

    let f = AnalyticsFilter::new().mcp_server("fs").session_id("s1");
    assert_eq!(storage.query(Some(&f)).await.unwrap().len(), 2);

    let f = AnalyticsFilter::new().session_id("nope");
    assert!(storage.query(Some(&f)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_ordered_by_timestamp() {
    let storage = seeded().await;
    let rows = storage.query(None).await.unwrap();
    let stamps: Vec<&str> = rows.iter().map(|r| r.timestamp.as_str()).collect();
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);
}

#[tokio::test]
async fn test_date_range_is_inclusive() {
    let storage = seeded().await;
    let rows = storage
        .query_by_date_range("2026-01-02T00:00:00.000Z", "2026-01-03T00:00:00.000Z")
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].tool_name, "Read");
    assert_eq!(rows[1].tool_name, "Grep");
}

#[tokio::test]
async fn test_null_session_round_trips() {
    let storage = seeded().await;
    let rows = storage.query(None).await.unwrap();
    assert!(rows[3].session_id.is_none());
    assert!(rows[3].metadata.is_none());
}

#[tokio::test]
async fn test_metadata_round_trips() {
    let storage = AnalyticsStorage::open_in_memory(&AnalyticsConfig::in_memory()).unwrap();
    let meta = EntryMetadata::new().with("strategy", "dedup").with("lines", 12);
    let e = AnalyticsEvent::new(HookPhase::PreToolUse, "Read", "fs", 10, 1)
        .with_metadata(meta.clone())
        .stamp("2026-01-01T00:00:00.000Z");
    storage.save(e).await.unwrap();
    let rows = storage.query(None).await.unwrap();
    assert_eq!(rows[0].metadata.as_ref(), Some(&meta));
    assert_eq!(rows[0].metadata.as_ref().unwrap().get_i64("lines"), Some(12));
}

#[tokio::test]
async fn test_malformed_metadata_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analytics.db");
    let storage = AnalyticsStorage::open(&path, &AnalyticsConfig::in_memory()).unwrap();
    storage.count().await.unwrap();

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute(
        "INSERT INTO analytics (hook_phase, tool_name, mcp_server, original_tokens,
             optimized_tokens, tokens_saved, timestamp, session_id, metadata)
         VALUES ('Mystery', 'Read', 'fs', 5, 1, 4, '2026-01-01T00:00:00.000Z', NULL, '{not json')",
        [],
    )
    .unwrap();
    drop(raw);

    let rows = storage.query(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].metadata.is_none());
    assert_eq!(rows[0].hook_phase, HookPhase::Unknown);
    assert_eq!(rows[0].tokens_saved, 4);
}

// ========== Failures ==========

fn rejected(i: usize) -> AnalyticsEntry {
    AnalyticsEvent::new(HookPhase::PreToolUse, "boom", "fs", 10, 5)
        .stamp(format!("2026-01-01T00:01:{:02}.000Z", i % 60))
}

/// Make every insert of a `boom` row abort.
fn install_reject_trigger(path: &std::path::Path) {
    let raw = rusqlite::Connection::open(path).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON analytics
         WHEN NEW.tool_name = 'boom'
         BEGIN SELECT RAISE(ABORT, 'boom'); END;",
    )
    .unwrap();
}

fn drop_reject_trigger(path: &std::path::Path) {
    let raw = rusqlite::Connection::open(path).unwrap();
    raw.execute_batch("DROP TRIGGER reject_boom;").unwrap();
}

#[tokio::test]
async fn test_save_batch_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analytics.db");
    let storage = AnalyticsStorage::open(&path, &config(100, 60_000)).unwrap();
    storage.count().await.unwrap();
    install_reject_trigger(&path);

    let err = storage
        .save_batch(vec![entry(0), entry(1), rejected(2)])
        .await
        .unwrap_err();
    assert!(matches!(err, TkoError::Storage(_)));
    assert_eq!(storage.count().await.unwrap(), 0);

    storage.save_batch(vec![entry(3), entry(4)]).await.unwrap();
    assert_eq!(storage.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_flush_keeps_entries_queued() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analytics.db");
    let storage = AnalyticsStorage::open(&path, &config(100, 60_000)).unwrap();
    storage.count().await.unwrap();
    install_reject_trigger(&path);

    storage.save(entry(0)).await.unwrap();
    storage.save(rejected(1)).await.unwrap();
    assert!(storage.flush().await.is_err());
    assert_eq!(storage.pending(), 2);

    storage.save(entry(2)).await.unwrap();
    assert_eq!(storage.pending(), 3);

    drop_reject_trigger(&path);
    assert_eq!(storage.flush().await.unwrap(), 3);
    assert_eq!(storage.pending(), 0);
    let tools: Vec<String> = storage
        .query(None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.tool_name)
        .collect();
    assert_eq!(tools, ["Read", "Read", "boom"]);
}

// ========== Lifecycle ==========

#[tokio::test]
async fn test_clear_returns_removed_count() {
    let storage = seeded().await;
    storage.save(entry(9)).await.unwrap();
    assert_eq!(storage.clear().await.unwrap(), 5);
    assert_eq!(storage.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_close_rejects_further_use() {
    let storage = AnalyticsStorage::open_in_memory(&AnalyticsConfig::in_memory()).unwrap();
    storage.close().await.unwrap();
    assert!(storage.is_closed());
    let err = storage.save(entry(0)).await.unwrap_err();
    assert!(matches!(err, TkoError::Closed(_)));
    assert!(matches!(storage.query(None).await, Err(TkoError::Closed(_))));
    // Closing twice is harmless.
    storage.close().await.unwrap();
}

#[tokio::test]
async fn test_close_flushes_queue_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analytics.db");
    let storage = AnalyticsStorage::open(&path, &AnalyticsConfig::in_memory()).unwrap();
    storage.save(entry(0)).await.unwrap();
    storage.save(entry(1)).await.unwrap();
    storage.close().await.unwrap();

    let reopened = AnalyticsStorage::open(&path, &AnalyticsConfig::in_memory()).unwrap();
    assert_eq!(reopened.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_drop_flushes_queue_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("analytics.db");
    {
        let storage = AnalyticsStorage::open(&path, &AnalyticsConfig::in_memory()).unwrap();
        for i in 0..7 {
            storage.save(entry(i)).await.unwrap();
        }
        assert_eq!(storage.pending(), 7);
    }
    let reopened = AnalyticsStorage::open(&path, &AnalyticsConfig::in_memory()).unwrap();
    assert_eq!(reopened.count().await.unwrap(), 7);
}

#[test]
fn test_open_fails_for_unusable_path() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let result = AnalyticsStorage::open(&blocker.join("analytics.db"), &AnalyticsConfig::in_memory());
    assert!(result.is_err());
}
