//! Pipeline, result cache and analytics tracking behind one call.

use crate::pipeline::{OptimizationLevel, OptimizationPipeline, PipelineResult};
use std::sync::Arc;
use std::time::Instant;
use tko_analytics::AnalyticsManager;
use tko_cache::{fingerprint, CacheEngine, CacheHelper, CompressionAlgorithm};
use tko_core::{AnalyticsEntry, AnalyticsEvent, EntryMetadata, HookPhase, Result, TkoConfig};
use tko_tokens::{context_savings, SavingsPolicy, TokenCounter};

/// One piece of content to optimize and where it came from.
#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub text: String,
    pub hook_phase: HookPhase,
    pub tool_name: String,
    pub mcp_server: String,
    pub session_id: Option<String>,
    /// What stays in the caller's context. Defaults to the optimized text.
    pub policy: Option<SavingsPolicy>,
}

impl OptimizeRequest {
    pub fn new(
        text: impl Into<String>,
        hook_phase: HookPhase,
        tool_name: impl Into<String>,
        mcp_server: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            hook_phase,
            tool_name: tool_name.into(),
            mcp_server: mcp_server.into(),
            session_id: None,
            policy: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_policy(mut self, policy: SavingsPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub result: PipelineResult,
    pub cache_hit: bool,
    /// The analytics entry recorded for this call.
    pub entry: AnalyticsEntry,
}

pub struct Optimizer {
    pipeline: OptimizationPipeline,
    cache: Option<CacheHelper>,
    analytics: Arc<AnalyticsManager>,
}

impl Optimizer {
    pub fn new(pipeline: OptimizationPipeline, cache: Option<CacheHelper>, analytics: Arc<AnalyticsManager>) -> Self {
        Self { pipeline, cache, analytics }
    }

    /// Build the full stack from configuration: tiktoken counter, cache
    /// engine, analytics storage and the preset for `level`.
    pub fn from_config(config: &TkoConfig, level: OptimizationLevel) -> Result<Self> {
        let tokenizer = Arc::new(TokenCounter::from_config(&config.tokens)?);
        let pipeline = OptimizationPipeline::preset(level, tokenizer)?;
        let engine = Arc::new(CacheEngine::from_config(&config.cache)?);
        let algorithm = CompressionAlgorithm::from_config(&config.cache.compression, config.cache.compression_level)?;
        let analytics = Arc::new(AnalyticsManager::from_config(&config.analytics)?);
        Ok(Self::new(pipeline, Some(CacheHelper::new(engine, algorithm)), analytics))
    }

    pub fn pipeline(&self) -> &OptimizationPipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> Option<&CacheHelper> {
        self.cache.as_ref()
    }

    pub fn analytics(&self) -> &Arc<AnalyticsManager> {
        &self.analytics
    }

    /// Key under which the result for `text` is cached. Depends on the module
    /// order, so a differently configured pipeline never reads it.
    pub fn cache_key(&self, text: &str) -> String {
        let modules = self.pipeline.module_names().join(",");
        fingerprint(&["pipeline", modules.as_str(), text])
    }

    /// Serve from the result cache or run the pipeline, then record the
    /// operation. A failing module records nothing. On a cache hit
    /// `execution_time_ms` is the time spent on the lookup.
    pub async fn optimize(&self, request: OptimizeRequest) -> Result<OptimizeOutcome> {
        let started = Instant::now();
        let key = self.cache_key(&request.text);
        let cached = match &self.cache {
            Some(cache) => cache.get_json::<PipelineResult>(&key)?,
            None => None,
        };
        let cache_hit = cached.is_some();
        let result = match cached {
            Some(mut result) => {
                result.execution_time_ms = started.elapsed().as_millis() as u64;
                result
            }
            None => {
                let result = self.pipeline.optimize(&request.text).await?;
                if let Some(cache) = &self.cache {
                    cache.set_json(&key, &result)?;
                }
                result
            }
        };

        let policy = request.policy.unwrap_or(SavingsPolicy::Retained {
            remaining_tokens: result.optimized_tokens,
        });
        let savings = context_savings(result.original_tokens, policy);
        let metadata = EntryMetadata::new()
            .with("cacheHit", cache_hit)
            .with("modules", result.applied_modules.join(","))
            .with("executionTimeMs", result.execution_time_ms);
        let mut event = AnalyticsEvent::new(
            request.hook_phase,
            request.tool_name,
            request.mcp_server,
            savings.original_tokens,
            savings.optimized_tokens,
        )
        .with_tokens_saved(savings.tokens_saved)
        .with_metadata(metadata);
        if let Some(session) = request.session_id {
            event = event.with_session(session);
        }
        let entry = self.analytics.track(event).await?;
        tracing::debug!(cache_hit, tokens_saved = entry.tokens_saved, "optimization tracked");

        Ok(OptimizeOutcome { result, cache_hit, entry })
    }

    pub async fn flush(&self) -> Result<usize> {
        self.analytics.flush().await
    }

    /// Flush analytics and release both stores.
    pub async fn close(&self) -> Result<()> {
        self.analytics.close().await?;
        if let Some(cache) = &self.cache {
            cache.engine().close()?;
        }
        Ok(())
    }
}
