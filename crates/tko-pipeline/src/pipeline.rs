//! Sequential module pipeline with per-stage token accounting.

use crate::abbreviate::Abbreviate;
use crate::dedup::Dedup;
use crate::dictionary::DictionaryEncode;
use crate::format::FormatCleanup;
use crate::jsonl::JsonlCleanup;
use crate::module::OptimizationModule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tko_core::{EntryMetadata, Result, TkoError};
use tko_tokens::{percent_saved, Tokenizer};

/// Preset module lists, from safest to most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// JSONL cleanup, format cleanup, dedup.
    Lossless,
    /// Lossless plus abbreviations.
    Minimal,
    /// Minimal plus dictionary encoding.
    Balanced,
}

impl OptimizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lossless => "lossless",
            Self::Minimal => "minimal",
            Self::Balanced => "balanced",
        }
    }

    /// The modules for this level, in application order.
    pub fn modules(&self) -> Result<Vec<Box<dyn OptimizationModule>>> {
        let mut modules: Vec<Box<dyn OptimizationModule>> = vec![
            Box::new(JsonlCleanup::default()),
            Box::new(FormatCleanup::default()),
            Box::new(Dedup::default()),
        ];
        if matches!(self, Self::Minimal | Self::Balanced) {
            let abbreviate = Abbreviate::with_defaults().map_err(|e| TkoError::Config(e.to_string()))?;
            modules.push(Box::new(abbreviate));
        }
        if matches!(self, Self::Balanced) {
            modules.push(Box::new(DictionaryEncode::default()));
        }
        Ok(modules)
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = TkoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lossless" => Ok(Self::Lossless),
            "minimal" => Ok(Self::Minimal),
            "balanced" => Ok(Self::Balanced),
            other => Err(TkoError::Config(format!("unknown optimization level: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResult {
    pub module_name: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub savings: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub text: String,
    pub original_tokens: u64,
    pub optimized_tokens: u64,
    pub savings: i64,
    pub percent_saved: f64,
    pub applied_modules: Vec<String>,
    pub module_results: Vec<ModuleResult>,
    pub execution_time_ms: u64,
}

pub struct OptimizationPipeline {
    modules: Vec<Box<dyn OptimizationModule>>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl OptimizationPipeline {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { modules: Vec::new(), tokenizer }
    }

    pub fn from_modules(tokenizer: Arc<dyn Tokenizer>, modules: Vec<Box<dyn OptimizationModule>>) -> Self {
        Self { modules, tokenizer }
    }

    pub fn preset(level: OptimizationLevel, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        Ok(Self::from_modules(tokenizer, level.modules()?))
    }

    /// Append a module; it runs after every module already added.
    pub fn with_module(mut self, module: impl OptimizationModule + 'static) -> Self {
        self.push(Box::new(module));
        self
    }

    pub fn push(&mut self, module: Box<dyn OptimizationModule>) {
        self.modules.push(module);
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    fn count(&self, text: &str) -> u64 {
        self.tokenizer.count_tokens(text) as u64
    }

    /// Run every module in order, feeding each one the previous output. The
    /// first failing module aborts the run.
    pub async fn optimize(&self, text: &str) -> Result<PipelineResult> {
        let started = Instant::now();
        let original_tokens = self.count(text);
        let mut current = text.to_string();
        let mut module_results = Vec::with_capacity(self.modules.len());

        for module in &self.modules {
            let name = module.name();
            let tokens_in = self.count(&current);
            let output = module.apply(&current).await.map_err(|source| {
                tracing::warn!(module = name, error = %source, "optimization module failed");
                TkoError::Module { module: name.to_string(), source }
            })?;
            let tokens_out = self.count(&output.text);
            tracing::debug!(module = name, tokens_in, tokens_out, "module applied");
            module_results.push(ModuleResult {
                module_name: name.to_string(),
                tokens_in,
                tokens_out,
                savings: tokens_in as i64 - tokens_out as i64,
                metadata: output.metadata,
            });
            current = output.text;
        }

        let optimized_tokens = self.count(&current);
        let savings = original_tokens as i64 - optimized_tokens as i64;
        Ok(PipelineResult {
            text: current,
            original_tokens,
            optimized_tokens,
            savings,
            percent_saved: percent_saved(savings, original_tokens),
            applied_modules: module_results.iter().map(|r| r.module_name.clone()).collect(),
            module_results,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
