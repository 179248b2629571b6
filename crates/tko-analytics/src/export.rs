//! JSON and CSV renderings of analytics entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tko_core::{AnalyticsEntry, Result, TkoError};

pub const CSV_HEADER: &str =
    "hookPhase,toolName,mcpServer,originalTokens,optimizedTokens,tokensSaved,timestamp,sessionId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = TkoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(TkoError::Config(format!("unknown export format: {other}"))),
        }
    }
}

/// Pretty-printed JSON array.
pub fn to_json(entries: &[AnalyticsEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Quote a field if it contains a comma, quote or line break; inner quotes
/// are doubled.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Header row followed by one row per entry. An empty set yields the header
/// alone.
pub fn to_csv(entries: &[AnalyticsEntry]) -> String {
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for e in entries {
        let fields = [
            e.hook_phase.as_str().to_string(),
            e.tool_name.clone(),
            e.mcp_server.clone(),
            e.original_tokens.to_string(),
            e.optimized_tokens.to_string(),
            e.tokens_saved.to_string(),
            e.timestamp.clone(),
            e.session_id.clone().unwrap_or_default(),
        ];
        let row: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
        lines.push(row.join(","));
    }
    lines.join("\n")
}
