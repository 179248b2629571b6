use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tko_core::{Result, TkoError, TokenConfig};

/// Anything that can count tokens in a piece of text.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;

    fn name(&self) -> &str;
}

/// Result of counting a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCount {
    pub tokens: usize,
    pub characters: usize,
}

/// BPE token counter with a content-hash result cache.
pub struct TokenCounter {
    encoding: String,
    bpe: Arc<CoreBPE>,
    cache: Cache<String, usize>,
}

impl TokenCounter {
    /// Counter for `cl100k_base` with the given cache capacity.
    pub fn new(cache_capacity: u64) -> Result<Self> {
        Self::with_encoding("cl100k_base", cache_capacity)
    }

    pub fn from_config(config: &TokenConfig) -> Result<Self> {
        Self::with_encoding(&config.encoding, config.cache_capacity)
    }

    pub fn with_encoding(encoding: &str, cache_capacity: u64) -> Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => return Err(TkoError::Tokenizer(format!("unsupported encoding: {other}"))),
        }
        .map_err(|e| TkoError::Tokenizer(format!("load {encoding}: {e}")))?;
        tracing::debug!(encoding, cache_capacity, "token counter ready");
        Ok(Self {
            encoding: encoding.to_string(),
            bpe: Arc::new(bpe),
            cache: Cache::new(cache_capacity),
        })
    }

    /// Count tokens, uncached.
    pub fn count_uncached(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Count tokens, memoized per blake3 content hash.
    pub fn count_cached(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        self.cache.get_with(hash, || self.count_uncached(text))
    }

    pub fn count(&self, text: &str) -> TokenCount {
        TokenCount {
            tokens: self.count_cached(text),
            characters: text.chars().count(),
        }
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl Tokenizer for TokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.count_cached(text)
    }

    fn name(&self) -> &str {
        &self.encoding
    }
}

/// Length-based estimate (bytes / 4, rounded up). No vocabulary needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl HeuristicTokenizer {
    const BYTES_PER_TOKEN: usize = 4;
}

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(Self::BYTES_PER_TOKEN)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
