//! Strip bookkeeping fields from JSON-lines transcripts.

use crate::module::{ModuleOutput, OptimizationModule};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tko_core::EntryMetadata;

/// Fields that carry no meaning for a model reading the transcript.
pub const DEFAULT_STRIP_FIELDS: &[&str] = &[
    "timestamp",
    "trace_id",
    "span_id",
    "request_id",
    "client_version",
    "sdk_version",
    "log_level",
];

/// Drops noise fields and null/empty-string values from every top-level JSON
/// object line. Lines that are not JSON objects pass through trimmed; blank
/// lines are removed. Objects are re-serialized compactly. Input with no
/// object-looking line is left untouched.
pub struct JsonlCleanup {
    strip_fields: Vec<String>,
}

impl Default for JsonlCleanup {
    fn default() -> Self {
        Self::new(DEFAULT_STRIP_FIELDS.iter().copied())
    }
}

impl JsonlCleanup {
    pub fn new<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            strip_fields: fields.into_iter().map(str::to_string).collect(),
        }
    }

    fn prune(&self, map: &mut Map<String, Value>) -> usize {
        let before = map.len();
        for field in &self.strip_fields {
            map.remove(field);
        }
        map.retain(|_, v| !matches!(v, Value::Null) && v.as_str() != Some(""));
        before - map.len()
    }

    /// Cleaned line and number of fields removed; `None` for a blank line.
    pub fn clean_line(&self, line: &str) -> Option<(String, usize)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(mut map)) => {
                let removed = self.prune(&mut map);
                Some((Value::Object(map).to_string(), removed))
            }
            _ => Some((line.to_string(), 0)),
        }
    }

    pub fn clean(&self, text: &str) -> (String, usize) {
        let mut removed = 0;
        let mut out = Vec::new();
        for line in text.lines() {
            if let Some((cleaned, n)) = self.clean_line(line) {
                removed += n;
                out.push(cleaned);
            }
        }
        (out.join("\n"), removed)
    }
}

fn looks_like_jsonl(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with('{'))
}

#[async_trait]
impl OptimizationModule for JsonlCleanup {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        if !looks_like_jsonl(text) {
            return Ok(ModuleOutput::unchanged(text));
        }
        let (cleaned, removed) = self.clean(text);
        Ok(ModuleOutput::new(cleaned).with_metadata(EntryMetadata::new().with("fieldsRemoved", removed)))
    }
}
