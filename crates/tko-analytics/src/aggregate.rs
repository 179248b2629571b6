//! Per-dimension rollups of analytics entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tko_core::AnalyticsEntry;

/// Name used for the overall summary row.
pub const SUMMARY_NAME: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    pub name: String,
    pub total_operations: u64,
    pub total_original_tokens: u64,
    pub total_optimized_tokens: u64,
    pub total_tokens_saved: i64,
    /// 0 for an empty group.
    pub average_tokens_saved: f64,
    /// Saved / original * 100; 0 when nothing was counted.
    pub savings_percentage: f64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

impl AggregatedStats {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_operations: 0,
            total_original_tokens: 0,
            total_optimized_tokens: 0,
            total_tokens_saved: 0,
            average_tokens_saved: 0.0,
            savings_percentage: 0.0,
            first_seen: None,
            last_seen: None,
        }
    }

    fn add(&mut self, entry: &AnalyticsEntry) {
        self.total_operations += 1;
        self.total_original_tokens += entry.original_tokens;
        self.total_optimized_tokens += entry.optimized_tokens;
        self.total_tokens_saved += entry.tokens_saved;
        if self.first_seen.as_deref().map_or(true, |t| entry.timestamp.as_str() < t) {
            self.first_seen = Some(entry.timestamp.clone());
        }
        if self.last_seen.as_deref().map_or(true, |t| entry.timestamp.as_str() > t) {
            self.last_seen = Some(entry.timestamp.clone());
        }
    }

    fn finish(mut self) -> Self {
        self.average_tokens_saved = if self.total_operations > 0 {
            self.total_tokens_saved as f64 / self.total_operations as f64
        } else {
            0.0
        };
        self.savings_percentage = if self.total_original_tokens > 0 {
            self.total_tokens_saved as f64 / self.total_original_tokens as f64 * 100.0
        } else {
            0.0
        };
        self
    }
}

/// Rollup of all `entries` under one name.
pub fn aggregate<'a>(
    name: impl Into<String>,
    entries: impl IntoIterator<Item = &'a AnalyticsEntry>,
) -> AggregatedStats {
    let mut stats = AggregatedStats::empty(name);
    for entry in entries {
        stats.add(entry);
    }
    stats.finish()
}

/// One rollup per distinct key, sorted by `total_tokens_saved` descending
/// (ties broken by name).
pub fn group_by<F>(entries: &[AnalyticsEntry], key: F) -> Vec<AggregatedStats>
where
    F: Fn(&AnalyticsEntry) -> String,
{
    let mut groups: BTreeMap<String, AggregatedStats> = BTreeMap::new();
    for entry in entries {
        let name = key(entry);
        groups
            .entry(name.clone())
            .or_insert_with(|| AggregatedStats::empty(name))
            .add(entry);
    }
    let mut rows: Vec<AggregatedStats> = groups.into_values().map(AggregatedStats::finish).collect();
    rows.sort_by(|a, b| {
        b.total_tokens_saved
            .cmp(&a.total_tokens_saved)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// Grouped rollups plus the overall summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub groups: Vec<AggregatedStats>,
    pub summary: AggregatedStats,
}

impl Breakdown {
    pub fn build<F>(entries: &[AnalyticsEntry], key: F) -> Self
    where
        F: Fn(&AnalyticsEntry) -> String,
    {
        Self {
            groups: group_by(entries, key),
            summary: aggregate(SUMMARY_NAME, entries),
        }
    }

    pub fn group(&self, name: &str) -> Option<&AggregatedStats> {
        self.groups.iter().find(|g| g.name == name)
    }
}
