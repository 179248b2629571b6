//! Optimization analytics: a write-batched SQLite event log and the manager
//! that rolls it up per hook phase, tool and server.

pub mod aggregate;
pub mod export;
pub mod manager;
pub mod storage;

pub use aggregate::{aggregate, group_by, AggregatedStats, Breakdown};
pub use export::{to_csv, to_json, ExportFormat, CSV_HEADER};
pub use manager::AnalyticsManager;
pub use storage::AnalyticsStorage;
