//! Timestamp helpers. Every persisted timestamp is an ISO-8601 UTC string with
//! millisecond precision, so lexicographic order equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as an ISO-8601 string.
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
