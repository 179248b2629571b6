//! Whole-word abbreviation of common technical vocabulary.

use crate::module::{ModuleOutput, OptimizationModule};
use async_trait::async_trait;
use regex::{NoExpand, Regex};
use tko_core::EntryMetadata;

pub const DEFAULT_ABBREVIATIONS: &[(&str, &str)] = &[
    ("function", "fn"),
    ("variable", "var"),
    ("constant", "const"),
    ("parameter", "param"),
    ("argument", "arg"),
    ("configuration", "config"),
    ("environment", "env"),
    ("application", "app"),
    ("database", "db"),
    ("repository", "repo"),
    ("directory", "dir"),
    ("document", "doc"),
    ("information", "info"),
    ("authentication", "auth"),
    ("authorization", "authz"),
    ("implementation", "impl"),
    ("specification", "spec"),
    ("development", "dev"),
    ("production", "prod"),
    ("dependency", "dep"),
    ("dependencies", "deps"),
    ("kubernetes", "k8s"),
    ("container", "ctr"),
    ("infrastructure", "infra"),
    ("management", "mgmt"),
    ("operation", "op"),
    ("operations", "ops"),
    ("organization", "org"),
    ("technology", "tech"),
    ("communication", "comm"),
    ("performance", "perf"),
    ("distribution", "dist"),
    ("reference", "ref"),
    ("message", "msg"),
    ("command", "cmd"),
    ("request", "req"),
    ("response", "resp"),
    ("memory", "mem"),
    ("maximum", "max"),
    ("minimum", "min"),
    ("number", "num"),
    ("integer", "int"),
    ("boolean", "bool"),
];

struct Rule {
    pattern: Regex,
    short: String,
}

/// Replaces each listed word, case-insensitively and on word boundaries, with
/// its short form. Longer words are rewritten first.
pub struct Abbreviate {
    rules: Vec<Rule>,
}

impl Abbreviate {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self, regex::Error> {
        let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        let rules = pairs
            .into_iter()
            .map(|(long, short)| {
                let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(long)))?;
                Ok(Rule { pattern, short: short.to_string() })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn with_defaults() -> Result<Self, regex::Error> {
        Self::new(DEFAULT_ABBREVIATIONS.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Abbreviated text and the number of words replaced.
    pub fn abbreviate(&self, text: &str) -> (String, usize) {
        let mut out = text.to_string();
        let mut replaced = 0;
        for rule in &self.rules {
            let hits = rule.pattern.find_iter(&out).count();
            if hits == 0 {
                continue;
            }
            replaced += hits;
            out = rule.pattern.replace_all(&out, NoExpand(&rule.short)).into_owned();
        }
        (out, replaced)
    }
}

#[async_trait]
impl OptimizationModule for Abbreviate {
    fn name(&self) -> &str {
        "abbreviate"
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        let (out, replaced) = self.abbreviate(text);
        Ok(ModuleOutput::new(out).with_metadata(EntryMetadata::new().with("replacements", replaced)))
    }
}
