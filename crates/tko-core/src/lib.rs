//! Shared types for the token optimizer: error type, configuration, and the
//! analytics data model that flows between the cache, analytics and pipeline crates.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{AnalyticsConfig, CacheConfig, TkoConfig, TokenConfig};
pub use error::{Result, TkoError};
pub use types::{
    AnalyticsEntry, AnalyticsEvent, AnalyticsFilter, EntryMetadata, HookPhase,
};
