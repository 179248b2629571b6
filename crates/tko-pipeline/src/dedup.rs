//! Near-duplicate block removal.
//!
//! Text is split into blocks on blank lines. Blocks are compared by the
//! Jaccard similarity of their word shingles; in each group of similar
//! blocks only the longest survives, at the position it already had.

use crate::module::{ModuleOutput, OptimizationModule};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tko_core::EntryMetadata;

pub const DEFAULT_SHINGLE_SIZE: usize = 3;
pub const DEFAULT_THRESHOLD: f64 = 0.6;
const BLOCK_SEPARATOR: &str = "\n\n";

fn hash_words(words: &[&str]) -> u64 {
    let mut h = DefaultHasher::new();
    for w in words {
        w.hash(&mut h);
    }
    h.finish()
}

/// Hashed `k`-word shingles. A block shorter than `k` words is one shingle.
pub fn shingles(text: &str, k: usize) -> HashSet<u64> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < k.max(1) {
        return HashSet::from([hash_words(&words)]);
    }
    words.windows(k.max(1)).map(hash_words).collect()
}

pub fn jaccard(a: &HashSet<u64>, b: &HashSet<u64>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub struct Dedup {
    pub shingle_size: usize,
    pub threshold: f64,
}

impl Default for Dedup {
    fn default() -> Self {
        Self {
            shingle_size: DEFAULT_SHINGLE_SIZE,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Dedup {
    /// Indices of the blocks to drop.
    pub fn redundant_blocks(&self, blocks: &[&str]) -> HashSet<usize> {
        let sets: Vec<HashSet<u64>> = blocks.iter().map(|b| shingles(b, self.shingle_size)).collect();
        let mut grouped = vec![false; blocks.len()];
        let mut drop = HashSet::new();
        for i in 0..blocks.len() {
            if grouped[i] {
                continue;
            }
            let mut members = vec![i];
            for j in (i + 1)..blocks.len() {
                if !grouped[j] && jaccard(&sets[i], &sets[j]) >= self.threshold {
                    members.push(j);
                }
            }
            if members.len() < 2 {
                continue;
            }
            // Longest block wins; the earliest one on ties.
            let keep = members
                .iter()
                .copied()
                .fold(i, |best, idx| if blocks[idx].len() > blocks[best].len() { idx } else { best });
            for idx in members {
                grouped[idx] = true;
                if idx != keep {
                    drop.insert(idx);
                }
            }
        }
        drop
    }

    /// Deduplicated text and the number of blocks removed.
    pub fn dedupe(&self, text: &str) -> (String, usize) {
        let blocks: Vec<&str> = text.split(BLOCK_SEPARATOR).collect();
        if blocks.len() < 2 {
            return (text.to_string(), 0);
        }
        let drop = self.redundant_blocks(&blocks);
        if drop.is_empty() {
            return (text.to_string(), 0);
        }
        let kept: Vec<&str> = blocks
            .iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, b)| *b)
            .collect();
        (kept.join(BLOCK_SEPARATOR), drop.len())
    }
}

#[async_trait]
impl OptimizationModule for Dedup {
    fn name(&self) -> &str {
        "dedup"
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        let (out, removed) = self.dedupe(text);
        Ok(ModuleOutput::new(out).with_metadata(EntryMetadata::new().with("blocksRemoved", removed)))
    }
}
