//! Tracking front-end over [`AnalyticsStorage`] with per-dimension rollups and
//! exports.

use crate::aggregate::{aggregate, AggregatedStats, Breakdown, SUMMARY_NAME};
use crate::export::{self, ExportFormat};
use crate::storage::AnalyticsStorage;
use tko_core::time::now_iso;
use tko_core::{AnalyticsConfig, AnalyticsEntry, AnalyticsEvent, AnalyticsFilter, Result};

/// Open lower and upper bounds for one-sided date ranges.
const MIN_TIMESTAMP: &str = "";
const MAX_TIMESTAMP: &str = "\u{10FFFF}";

/// Session grouping key for entries without a session id.
pub const UNKNOWN_SESSION: &str = "unknown";

pub struct AnalyticsManager {
    storage: AnalyticsStorage,
}

impl AnalyticsManager {
    pub fn new(storage: AnalyticsStorage) -> Self {
        Self { storage }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        Ok(Self::new(AnalyticsStorage::from_config(config)?))
    }

    pub fn storage(&self) -> &AnalyticsStorage {
        &self.storage
    }

    /// Stamp `event` with the current time and persist it.
    pub async fn track(&self, event: AnalyticsEvent) -> Result<AnalyticsEntry> {
        let entry = event.stamp(now_iso());
        self.storage.save(entry.clone()).await?;
        Ok(entry)
    }

    /// Stamp every event with one shared instant and persist them as one batch.
    pub async fn track_batch(&self, events: Vec<AnalyticsEvent>) -> Result<Vec<AnalyticsEntry>> {
        let ts = now_iso();
        let entries: Vec<AnalyticsEntry> = events.into_iter().map(|e| e.stamp(ts.clone())).collect();
        self.storage.save_batch(entries.clone()).await?;
        Ok(entries)
    }

    /// Raw entries matching `filter`. A date range is resolved by the storage
    /// range query; the other fields are applied afterwards.
    pub async fn get_entries(&self, filter: Option<&AnalyticsFilter>) -> Result<Vec<AnalyticsEntry>> {
        let Some(filter) = filter else {
            return self.storage.query(None).await;
        };
        if !filter.has_date_range() {
            return self.storage.query(Some(filter)).await;
        }
        let start = filter.start_date.as_deref().unwrap_or(MIN_TIMESTAMP);
        let end = filter.end_date.as_deref().unwrap_or(MAX_TIMESTAMP);
        let rest = filter.without_dates();
        let entries = self.storage.query_by_date_range(start, end).await?;
        Ok(entries.into_iter().filter(|e| rest.matches(e)).collect())
    }

    pub async fn get_hook_analytics(&self, filter: Option<&AnalyticsFilter>) -> Result<Breakdown> {
        let entries = self.get_entries(filter).await?;
        Ok(Breakdown::build(&entries, |e| e.hook_phase.as_str().to_string()))
    }

    pub async fn get_action_analytics(&self, filter: Option<&AnalyticsFilter>) -> Result<Breakdown> {
        let entries = self.get_entries(filter).await?;
        Ok(Breakdown::build(&entries, |e| e.tool_name.clone()))
    }

    pub async fn get_server_analytics(&self, filter: Option<&AnalyticsFilter>) -> Result<Breakdown> {
        let entries = self.get_entries(filter).await?;
        Ok(Breakdown::build(&entries, |e| e.mcp_server.clone()))
    }

    pub async fn get_session_analytics(&self, filter: Option<&AnalyticsFilter>) -> Result<Breakdown> {
        let entries = self.get_entries(filter).await?;
        Ok(Breakdown::build(&entries, |e| {
            e.session_id.clone().unwrap_or_else(|| UNKNOWN_SESSION.to_string())
        }))
    }

    /// Overall rollup only.
    pub async fn summary(&self, filter: Option<&AnalyticsFilter>) -> Result<AggregatedStats> {
        let entries = self.get_entries(filter).await?;
        Ok(aggregate(SUMMARY_NAME, &entries))
    }

    pub async fn export_as_json(&self, filter: Option<&AnalyticsFilter>) -> Result<String> {
        let entries = self.get_entries(filter).await?;
        export::to_json(&entries)
    }

    pub async fn export_as_csv(&self, filter: Option<&AnalyticsFilter>) -> Result<String> {
        let entries = self.get_entries(filter).await?;
        Ok(export::to_csv(&entries))
    }

    pub async fn export(&self, format: ExportFormat, filter: Option<&AnalyticsFilter>) -> Result<String> {
        match format {
            ExportFormat::Json => self.export_as_json(filter).await,
            ExportFormat::Csv => self.export_as_csv(filter).await,
        }
    }

    pub async fn flush(&self) -> Result<usize> {
        self.storage.flush().await
    }

    pub async fn clear(&self) -> Result<usize> {
        self.storage.clear().await
    }

    pub async fn close(&self) -> Result<()> {
        self.storage.close().await
    }
}
