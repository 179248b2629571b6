//! Token counting and savings arithmetic.
//!
//! Counting goes through the narrow [`Tokenizer`] trait so callers can swap
//! the tiktoken-backed [`TokenCounter`] for a cheaper estimate or a test double.

pub mod counter;
pub mod savings;

pub use counter::{HeuristicTokenizer, TokenCount, TokenCounter, Tokenizer};
pub use savings::{
    calculate_cache_hit_rate, calculate_savings, context_savings, effective, percent_saved,
    SavingsPolicy, SavingsResult, TokenUsage,
};
