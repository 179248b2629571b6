//! Memoize a module's output in the persistent cache.

use crate::module::{ModuleOutput, OptimizationModule};
use async_trait::async_trait;
use std::time::Duration;
use tko_cache::{fingerprint, CacheHelper};

/// Wraps a deterministic module and stores its output keyed by
/// `fingerprint(["module", name, input])`. A write that lands before the
/// caller gives up stays committed.
pub struct CachedModule<M> {
    inner: M,
    cache: CacheHelper,
    ttl: Option<Duration>,
}

impl<M: OptimizationModule> CachedModule<M> {
    pub fn new(inner: M, cache: CacheHelper) -> Self {
        let ttl = cache.engine().limits().default_ttl;
        Self { inner, cache, ttl }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn cache_key(&self, text: &str) -> String {
        fingerprint(&["module", self.inner.name(), text])
    }
}

#[async_trait]
impl<M: OptimizationModule> OptimizationModule for CachedModule<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        let key = self.cache_key(text);
        if let Some(hit) = self.cache.get_json::<ModuleOutput>(&key)? {
            tracing::debug!(module = self.inner.name(), "module cache hit");
            return Ok(hit);
        }
        let output = self.inner.apply(text).await?;
        let bytes = serde_json::to_vec(&output)?;
        self.cache.set_bytes_with_ttl(&key, &bytes, self.ttl)?;
        Ok(output)
    }
}
