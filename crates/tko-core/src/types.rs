use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Lifecycle stage of the host at which an optimization event was recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPhase {
    PreToolUse,
    PostToolUse,
    SessionStart,
    PreCompact,
    UserPromptSubmit,
    Unknown,
}

impl HookPhase {
    pub const ALL: [HookPhase; 6] = [
        HookPhase::PreToolUse,
        HookPhase::PostToolUse,
        HookPhase::SessionStart,
        HookPhase::PreCompact,
        HookPhase::UserPromptSubmit,
        HookPhase::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::SessionStart => "SessionStart",
            Self::PreCompact => "PreCompact",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Unknown => "Unknown",
        }
    }

    /// Lenient parse used when reading persisted rows: anything unrecognized
    /// maps to `Unknown`.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown hook phase: {s}"))
    }
}

/// Free-form structured metadata attached to an analytics entry.
///
/// Stored as an opaque JSON object string; read back through the typed
/// accessors below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryMetadata(Map<String, Value>);

impl EntryMetadata {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// Parse a persisted blob. Anything that is not a JSON object is treated
    /// as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(Self(map)),
            Ok(other) => {
                tracing::warn!(kind = json_kind(&other), "ignoring non-object metadata");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed metadata");
                None
            }
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An optimization event as submitted by a caller. It has no timestamp: the
/// analytics layer assigns one when the event is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub hook_phase: HookPhase,
    pub tool_name: String,
    pub mcp_server: String,
    pub original_tokens: u64,
    pub optimized_tokens: u64,
    pub tokens_saved: i64,
    pub session_id: Option<String>,
    pub metadata: Option<EntryMetadata>,
}

impl AnalyticsEvent {
    /// New event with `tokens_saved = original - optimized`.
    pub fn new(
        hook_phase: HookPhase,
        tool_name: impl Into<String>,
        mcp_server: impl Into<String>,
        original_tokens: u64,
        optimized_tokens: u64,
    ) -> Self {
        Self {
            hook_phase,
            tool_name: tool_name.into(),
            mcp_server: mcp_server.into(),
            original_tokens,
            optimized_tokens,
            tokens_saved: original_tokens as i64 - optimized_tokens as i64,
            session_id: None,
            metadata: None,
        }
    }

    pub fn with_tokens_saved(mut self, saved: i64) -> Self {
        self.tokens_saved = saved;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn stamp(self, timestamp: impl Into<String>) -> AnalyticsEntry {
        AnalyticsEntry {
            hook_phase: self.hook_phase,
            tool_name: self.tool_name,
            mcp_server: self.mcp_server,
            original_tokens: self.original_tokens,
            optimized_tokens: self.optimized_tokens,
            tokens_saved: self.tokens_saved,
            timestamp: timestamp.into(),
            session_id: self.session_id,
            metadata: self.metadata,
        }
    }
}

/// A persisted optimization event. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEntry {
    pub hook_phase: HookPhase,
    pub tool_name: String,
    pub mcp_server: String,
    pub original_tokens: u64,
    pub optimized_tokens: u64,
    pub tokens_saved: i64,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

/// Conjunctive filter over analytics entries. `None` fields impose no
/// constraint; the date bounds are inclusive ISO-8601 strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsFilter {
    pub hook_phase: Option<HookPhase>,
    pub tool_name: Option<String>,
    pub mcp_server: Option<String>,
    pub session_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl AnalyticsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_phase(mut self, phase: HookPhase) -> Self {
        self.hook_phase = Some(phase);
        self
    }

    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn mcp_server(mut self, server: impl Into<String>) -> Self {
        self.mcp_server = Some(server.into());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn date_range(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn has_date_range(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }

    /// Same filter with the date bounds removed.
    pub fn without_dates(&self) -> Self {
        Self {
            start_date: None,
            end_date: None,
            ..self.clone()
        }
    }

    pub fn matches(&self, entry: &AnalyticsEntry) -> bool {
        if let Some(phase) = self.hook_phase {
            if entry.hook_phase != phase {
                return false;
            }
        }
        if let Some(ref tool) = self.tool_name {
            if &entry.tool_name != tool {
                return false;
            }
        }
        if let Some(ref server) = self.mcp_server {
            if &entry.mcp_server != server {
                return false;
            }
        }
        if let Some(ref session) = self.session_id {
            if entry.session_id.as_ref() != Some(session) {
                return false;
            }
        }
        if let Some(ref start) = self.start_date {
            if entry.timestamp.as_str() < start.as_str() {
                return false;
            }
        }
        if let Some(ref end) = self.end_date {
            if entry.timestamp.as_str() > end.as_str() {
                return false;
            }
        }
        true
    }
}
