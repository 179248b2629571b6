//! Text optimization pipeline.
//!
//! An [`OptimizationPipeline`] runs [`OptimizationModule`]s strictly in order,
//! counting tokens before and after each one. Built-in modules:
//! 1. [`JsonlCleanup`]: strip bookkeeping fields from JSON lines
//! 2. [`FormatCleanup`]: whitespace, punctuation and emoji cleanup
//! 3. [`Dedup`]: near-duplicate block removal
//! 4. [`Abbreviate`]: whole-word abbreviation
//! 5. [`DictionaryEncode`]: frequent phrases to `$XX` codes
//!
//! [`Optimizer`] adds the result cache and analytics tracking on top.

pub mod abbreviate;
pub mod cached;
pub mod dedup;
pub mod dictionary;
pub mod format;
pub mod jsonl;
pub mod module;
pub mod optimizer;
pub mod pipeline;

pub use abbreviate::Abbreviate;
pub use cached::CachedModule;
pub use dedup::Dedup;
pub use dictionary::{Codebook, DictionaryEncode};
pub use format::FormatCleanup;
pub use jsonl::JsonlCleanup;
pub use module::{ModuleOutput, OptimizationModule};
pub use optimizer::{OptimizeOutcome, OptimizeRequest, Optimizer};
pub use pipeline::{ModuleResult, OptimizationLevel, OptimizationPipeline, PipelineResult};

#[cfg(test)]
mod tests;
