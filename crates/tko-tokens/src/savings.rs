//! Savings arithmetic.
//!
//! Savings are always measured against what stays in the caller's visible
//! context, chosen explicitly through [`SavingsPolicy`]. Byte-level
//! compression of cached payloads never counts as context savings.

use serde::{Deserialize, Serialize};

/// Zero-default for optional counters.
pub fn effective(x: Option<u64>) -> u64 {
    x.unwrap_or(0)
}

/// `saved / original * 100`, or 0 when there was nothing to save.
pub fn percent_saved(saved: i64, original: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    saved as f64 / original as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsResult {
    pub original_tokens: u64,
    pub optimized_tokens: u64,
    pub tokens_saved: i64,
    pub percent_saved: f64,
}

pub fn calculate_savings(original_tokens: u64, optimized_tokens: u64) -> SavingsResult {
    let tokens_saved = original_tokens as i64 - optimized_tokens as i64;
    SavingsResult {
        original_tokens,
        optimized_tokens,
        tokens_saved,
        percent_saved: percent_saved(tokens_saved, original_tokens),
    }
}

/// Hit rate in percent; 0 when there were no lookups.
pub fn calculate_cache_hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64 * 100.0
}

/// How much of the original content remains in the caller's context after an
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SavingsPolicy {
    /// Nothing remains in context; the content lives only in the cache.
    Externalized,
    /// A summary, diff or optimized rendition of this size remains.
    Retained { remaining_tokens: u64 },
    /// The full content remains.
    Unchanged,
}

impl SavingsPolicy {
    pub fn remaining_tokens(&self, original_tokens: u64) -> u64 {
        match self {
            Self::Externalized => 0,
            Self::Retained { remaining_tokens } => *remaining_tokens,
            Self::Unchanged => original_tokens,
        }
    }
}

/// Context savings for `original_tokens` under `policy`. Negative when the
/// retained rendition is larger than the original.
pub fn context_savings(original_tokens: u64, policy: SavingsPolicy) -> SavingsResult {
    calculate_savings(original_tokens, policy.remaining_tokens(original_tokens))
}

/// Token usage of one model request. Missing counters count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + effective(self.output_tokens)
    }

    /// Tokens not served from a provider-side prompt cache.
    pub fn uncached_input(&self) -> u64 {
        self.input_tokens.saturating_sub(effective(self.cached_tokens))
    }

    pub fn merge(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: Some(effective(self.output_tokens) + effective(other.output_tokens)),
            cached_tokens: Some(effective(self.cached_tokens) + effective(other.cached_tokens)),
        }
    }
}
