//! Whitespace, punctuation and emoji cleanup.

use crate::module::{ModuleOutput, OptimizationModule};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tko_core::EntryMetadata;

static RE_EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "[\u{1F600}-\u{1F64F}\u{1F300}-\u{1F5FF}\u{1F680}-\u{1F6FF}\u{1F1E0}-\u{1F1FF}\
         \u{2702}-\u{27B0}\u{1F900}-\u{1F9FF}\u{1FA00}-\u{1FAFF}\u{2600}-\u{26FF}]+",
    )
    .unwrap()
});
static RE_MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());

/// Full-width CJK punctuation and typographic quotes mapped to ASCII.
fn ascii_punct(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{FF0C}' | '\u{3001}' => ",",
        '\u{3002}' => ".",
        '\u{FF1B}' => ";",
        '\u{FF1A}' => ":",
        '\u{FF01}' => "!",
        '\u{FF1F}' => "?",
        '\u{201C}' | '\u{201D}' => "\"",
        '\u{2018}' | '\u{2019}' => "'",
        '\u{FF08}' => "(",
        '\u{FF09}' => ")",
        '\u{3010}' => "[",
        '\u{3011}' => "]",
        '\u{2026}' => "...",
        '\u{FF5E}' => "~",
        _ => return None,
    })
}

pub fn normalize_punctuation(text: &str) -> String {
    let text = text.replace("\u{2014}\u{2014}", "--");
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match ascii_punct(c) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

/// Trim trailing whitespace per line, keep at most one blank line in a row,
/// and trim the whole text.
pub fn tidy_whitespace(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = false;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if blank_run {
                continue;
            }
            blank_run = true;
        } else {
            blank_run = false;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}

/// Drop repeated non-blank lines (compared trimmed), keeping the first.
/// Returns the text and the number of lines dropped.
pub fn dedupe_lines(text: &str) -> (String, usize) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0;
    for line in text.lines() {
        let key = line.trim();
        if !key.is_empty() && !seen.insert(key) {
            dropped += 1;
            continue;
        }
        kept.push(line);
    }
    (kept.join("\n"), dropped)
}

/// Remove emoji, then collapse the space runs they leave behind. Leading
/// indentation is preserved.
pub fn strip_emoji(text: &str) -> String {
    text.lines()
        .map(|line| {
            let body = line.trim_start_matches(' ');
            let indent = &line[..line.len() - body.len()];
            let stripped = RE_EMOJI.replace_all(body, "");
            format!("{indent}{}", RE_MULTI_SPACE.replace_all(&stripped, " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct FormatCleanup {
    pub normalize_punctuation: bool,
    pub dedupe_lines: bool,
    pub strip_emoji: bool,
}

impl Default for FormatCleanup {
    fn default() -> Self {
        Self {
            normalize_punctuation: true,
            dedupe_lines: true,
            strip_emoji: true,
        }
    }
}

impl FormatCleanup {
    /// Cleaned text and the number of duplicate lines removed.
    pub fn clean(&self, text: &str) -> (String, usize) {
        if text.is_empty() {
            return (String::new(), 0);
        }
        let mut out = if self.normalize_punctuation {
            normalize_punctuation(text)
        } else {
            text.to_string()
        };
        out = tidy_whitespace(&out);
        let mut dropped = 0;
        if self.dedupe_lines {
            let (deduped, n) = dedupe_lines(&out);
            out = deduped;
            dropped = n;
        }
        if self.strip_emoji {
            out = strip_emoji(&out);
        }
        (tidy_whitespace(&out), dropped)
    }
}

#[async_trait]
impl OptimizationModule for FormatCleanup {
    fn name(&self) -> &str {
        "format"
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        let (cleaned, dropped) = self.clean(text);
        Ok(ModuleOutput::new(cleaned).with_metadata(EntryMetadata::new().with("duplicateLines", dropped)))
    }
}
