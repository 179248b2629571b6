//! The module interface every pipeline stage implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tko_core::EntryMetadata;

/// Text produced by one module plus whatever it wants to report about the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl ModuleOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), metadata: None }
    }

    /// Output identical to the input, no metadata.
    pub fn unchanged(text: &str) -> Self {
        Self::new(text)
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One `text -> text` stage. Implementations must be deterministic for a
/// given input; [`crate::CachedModule`] relies on it.
#[async_trait]
pub trait OptimizationModule: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput>;
}

#[async_trait]
impl<M: OptimizationModule + ?Sized> OptimizationModule for Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        (**self).apply(text).await
    }
}

#[async_trait]
impl<M: OptimizationModule + ?Sized> OptimizationModule for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        (**self).apply(text).await
    }
}
