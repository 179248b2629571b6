//! Phrase dictionary encoding.
//!
//! Frequent multi-word phrases are replaced by short `$XX` codes. The codebook
//! travels in the module metadata so the output can be expanded again with
//! [`decode`]. A literal `$` in the input is escaped before encoding.

use crate::module::{ModuleOutput, OptimizationModule};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tko_core::EntryMetadata;

pub const DEFAULT_MIN_FREQUENCY: usize = 3;
pub const DEFAULT_MIN_PHRASE_LEN: usize = 6;
pub const DEFAULT_MAX_ENTRIES: usize = 200;
const MIN_WORDS: usize = 2;
const MAX_WORDS: usize = 5;
const DOLLAR_ESCAPE: &str = "\u{0}DLR\u{0}";

/// Code → phrase.
pub type Codebook = BTreeMap<String, String>;

/// `index`-th code: `$AA`..`$ZZ`, then `$AAA`..
pub fn code_for(index: usize) -> String {
    let letter = |n: usize| (b'A' + (n % 26) as u8) as char;
    if index < 26 * 26 {
        format!("${}{}", letter(index / 26), letter(index))
    } else {
        let i = index - 26 * 26;
        format!("${}{}{}", letter(i / (26 * 26)), letter(i / 26), letter(i))
    }
}

pub struct DictionaryEncode {
    pub min_frequency: usize,
    pub min_phrase_len: usize,
    pub max_entries: usize,
}

impl Default for DictionaryEncode {
    fn default() -> Self {
        Self {
            min_frequency: DEFAULT_MIN_FREQUENCY,
            min_phrase_len: DEFAULT_MIN_PHRASE_LEN,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl DictionaryEncode {
    fn phrase_counts(&self, text: &str) -> HashMap<String, usize> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut counts = HashMap::new();
        for n in MIN_WORDS..=MAX_WORDS {
            for window in words.windows(n) {
                let phrase = window.join(" ");
                if phrase.len() >= self.min_phrase_len {
                    *counts.entry(phrase).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Pick phrases by `frequency * length`, skipping any that overlap an
    /// already chosen phrase.
    pub fn build_codebook(&self, text: &str) -> Codebook {
        let mut candidates: Vec<(String, usize)> = self
            .phrase_counts(text)
            .into_iter()
            .filter(|(_, count)| *count >= self.min_frequency)
            .collect();
        candidates.sort_by(|a, b| {
            (b.1 * b.0.len())
                .cmp(&(a.1 * a.0.len()))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut chosen: Vec<String> = Vec::new();
        for (phrase, _) in candidates {
            if chosen.len() >= self.max_entries {
                break;
            }
            if chosen.iter().any(|c| c.contains(&phrase) || phrase.contains(c.as_str())) {
                continue;
            }
            chosen.push(phrase);
        }
        chosen
            .into_iter()
            .enumerate()
            .map(|(i, phrase)| (code_for(i), phrase))
            .collect()
    }

    /// Replace codebook phrases in one left-to-right pass, longest phrase
    /// first at each position. Emitted codes are never rescanned. A match
    /// directly followed by a capital letter is left as is so the code cannot
    /// be read back as a longer one.
    pub fn encode(&self, text: &str, codebook: &Codebook) -> Result<String, regex::Error> {
        if text.is_empty() || codebook.is_empty() {
            return Ok(text.to_string());
        }
        let escaped = text.replace('$', DOLLAR_ESCAPE);
        let codes: HashMap<String, &str> = codebook
            .iter()
            .map(|(code, phrase)| (phrase.replace('$', DOLLAR_ESCAPE), code.as_str()))
            .collect();
        let mut phrases: Vec<&String> = codes.keys().collect();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let pattern = phrases
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let re = Regex::new(&pattern)?;

        let encoded = re.replace_all(&escaped, |caps: &Captures| {
            let Some(m) = caps.get(0) else {
                return String::new();
            };
            let runs_on = escaped[m.end()..].starts_with(|c: char| c.is_ascii_uppercase());
            match codes.get(m.as_str()) {
                Some(code) if !runs_on => (*code).to_string(),
                _ => m.as_str().to_string(),
            }
        });
        Ok(encoded.into_owned())
    }
}

/// Expand codes back into phrases and restore escaped `$`. Every `$` left in
/// encoded text starts a code; the longest code in the codebook wins.
pub fn decode(text: &str, codebook: &Codebook) -> String {
    let longest = codebook.keys().map(String::len).max().unwrap_or(0);
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos].replace(DOLLAR_ESCAPE, "$"));
        let tail = &rest[pos..];
        let hit = (2..=longest)
            .rev()
            .filter_map(|n| tail.get(..n))
            .find_map(|code| codebook.get(code).map(|phrase| (code.len(), phrase)));
        match hit {
            Some((len, phrase)) => {
                out.push_str(phrase);
                rest = &tail[len..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(&rest.replace(DOLLAR_ESCAPE, "$"));
    out
}

/// Read a codebook back out of module metadata.
pub fn codebook_from_metadata(metadata: &EntryMetadata) -> Option<Codebook> {
    let Value::Object(map) = metadata.get("codebook")? else {
        return None;
    };
    map.iter()
        .map(|(code, phrase)| phrase.as_str().map(|p| (code.clone(), p.to_string())))
        .collect()
}

#[async_trait]
impl OptimizationModule for DictionaryEncode {
    fn name(&self) -> &str {
        "dictionary"
    }

    async fn apply(&self, text: &str) -> anyhow::Result<ModuleOutput> {
        let codebook = self.build_codebook(text);
        if codebook.is_empty() {
            return Ok(ModuleOutput::unchanged(text));
        }
        let encoded = self.encode(text, &codebook)?;
        let entries: Map<String, Value> = codebook
            .iter()
            .map(|(code, phrase)| (code.clone(), Value::String(phrase.clone())))
            .collect();
        let metadata = EntryMetadata::new()
            .with("entries", codebook.len())
            .with("codebook", Value::Object(entries));
        Ok(ModuleOutput::new(encoded).with_metadata(metadata))
    }
}
