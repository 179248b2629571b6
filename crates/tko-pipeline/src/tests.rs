use crate::dedup::{jaccard, shingles};
use crate::dictionary::{code_for, codebook_from_metadata, decode, Codebook};
use crate::format::{dedupe_lines, normalize_punctuation, strip_emoji, tidy_whitespace};
use crate::*;

// ========== JSONL cleanup ==========

#[test]
fn test_jsonl_strips_noise_fields() {
    let line = r#"{"role":"user","content":"hi","timestamp":"2024-01-01","trace_id":"abc"}"#;
    let (out, removed) = JsonlCleanup::default().clean_line(line).unwrap();
    assert_eq!(removed, 2);
    assert!(!out.contains("timestamp"));
    assert!(!out.contains("trace_id"));
    assert!(out.contains("\"content\":\"hi\""));
}

#[test]
fn test_jsonl_strips_null_and_empty() {
    let line = r#"{"role":"user","content":"hi","extra":null,"empty":""}"#;
    let (out, removed) = JsonlCleanup::default().clean_line(line).unwrap();
    assert_eq!(removed, 2);
    assert!(!out.contains("extra"));
    assert!(!out.contains("empty"));
}

#[test]
fn test_jsonl_non_json_and_blank() {
    let m = JsonlCleanup::default();
    assert_eq!(m.clean_line("  not json "), Some(("not json".to_string(), 0)));
    assert_eq!(m.clean_line("   "), None);
}

#[test]
fn test_jsonl_custom_fields() {
    let m = JsonlCleanup::new(["role"]);
    let (out, removed) = m.clean_line(r#"{"role":"user","timestamp":"t"}"#).unwrap();
    assert_eq!(removed, 1);
    assert!(out.contains("timestamp"));
}

#[tokio::test]
async fn test_jsonl_module_multiline() {
    let input = "{\"a\":1,\"timestamp\":\"t\"}\n\n{\"b\":2,\"trace_id\":\"x\"}";
    let out = JsonlCleanup::default().apply(input).await.unwrap();
    assert_eq!(out.text, "{\"a\":1}\n{\"b\":2}");
    assert_eq!(out.metadata.unwrap().get_i64("fieldsRemoved"), Some(2));
}

#[tokio::test]
async fn test_jsonl_module_skips_plain_text() {
    let input = "plain text\n\nnothing structured";
    let out = JsonlCleanup::default().apply(input).await.unwrap();
    assert_eq!(out.text, input);
    assert!(out.metadata.is_none());
}

// ========== Format cleanup ==========

#[test]
fn test_normalize_punctuation() {
    assert_eq!(normalize_punctuation("你好，世界。"), "你好,世界.");
    assert_eq!(normalize_punctuation("\u{201C}quote\u{201D}\u{2026}"), "\"quote\"...");
    assert_eq!(normalize_punctuation("a\u{2014}\u{2014}b"), "a--b");
}

#[test]
fn test_tidy_whitespace() {
    assert_eq!(tidy_whitespace("a  \n\n\n\nb\n"), "a\n\nb");
    assert_eq!(tidy_whitespace("\n\n  x"), "x");
}

#[test]
fn test_dedupe_lines_keeps_blank_lines() {
    let (out, dropped) = dedupe_lines("x\ny\n  x\n\nx");
    assert_eq!(out, "x\ny\n");
    assert_eq!(dropped, 2);
}

#[test]
fn test_strip_emoji_keeps_indent() {
    assert_eq!(strip_emoji("  deploy 🚀 now"), "  deploy now");
    assert_eq!(strip_emoji("no emoji"), "no emoji");
}

#[test]
fn test_strip_emoji_runs_and_lines() {
    assert_eq!(strip_emoji("done ✅✅ ok\n    party 🎉🎉   time"), "done ok\n    party time");
    assert_eq!(strip_emoji("☀ sunny"), " sunny");
}

#[test]
fn test_format_clean_all_passes() {
    let (out, dropped) = FormatCleanup::default().clean("Hello 👋  world\n\n\n\nHello 👋  world\nbye");
    assert_eq!(out, "Hello world\n\nbye");
    assert_eq!(dropped, 1);
}

#[test]
fn test_format_clean_empty() {
    assert_eq!(FormatCleanup::default().clean(""), (String::new(), 0));
}

#[test]
fn test_format_passes_can_be_disabled() {
    let m = FormatCleanup {
        normalize_punctuation: false,
        dedupe_lines: false,
        strip_emoji: false,
    };
    let (out, _) = m.clean("a，b\na，b 🚀");
    assert_eq!(out, "a，b\na，b 🚀");
}

// ========== Dedup ==========

#[test]
fn test_jaccard_bounds() {
    let a = shingles("the quick brown fox", 3);
    let b = shingles("something else entirely here", 3);
    assert_eq!(jaccard(&a, &a), 1.0);
    assert_eq!(jaccard(&a, &b), 0.0);
}

#[test]
fn test_short_block_is_single_shingle() {
    assert_eq!(shingles("hi", 3).len(), 1);
}

#[test]
fn test_dedup_exact_duplicates_keeps_first() {
    let text = "the quick brown fox jumps\n\nsomething else entirely here\n\nthe quick brown fox jumps";
    let (out, removed) = Dedup::default().dedupe(text);
    assert_eq!(removed, 1);
    assert_eq!(out, "the quick brown fox jumps\n\nsomething else entirely here");
}

#[test]
fn test_dedup_keeps_longest_near_duplicate() {
    let text = "the quick brown fox jumps over the lazy dog\n\n\
                unrelated words entirely here\n\n\
                the quick brown fox jumps over the lazy dog today";
    let (out, removed) = Dedup::default().dedupe(text);
    assert_eq!(removed, 1);
    assert_eq!(
        out,
        "unrelated words entirely here\n\nthe quick brown fox jumps over the lazy dog today"
    );
}

#[test]
fn test_dedup_single_block_untouched() {
    let (out, removed) = Dedup::default().dedupe("one block only");
    assert_eq!(out, "one block only");
    assert_eq!(removed, 0);
}

// ========== Abbreviate ==========

#[test]
fn test_abbreviate_defaults() {
    let m = Abbreviate::with_defaults().unwrap();
    let (out, n) = m.abbreviate("The function takes a parameter and returns a configuration");
    assert_eq!(out, "The fn takes a param and returns a config");
    assert_eq!(n, 3);
}

#[test]
fn test_abbreviate_case_insensitive() {
    let m = Abbreviate::with_defaults().unwrap();
    assert_eq!(m.abbreviate("The DATABASE connection").0, "The db connection");
}

#[test]
fn test_abbreviate_whole_words_only() {
    let m = Abbreviate::with_defaults().unwrap();
    let (out, n) = m.abbreviate("functional programming");
    assert_eq!(out, "functional programming");
    assert_eq!(n, 0);
}

#[test]
fn test_abbreviate_prefers_longer_word() {
    let m = Abbreviate::with_defaults().unwrap();
    assert_eq!(m.abbreviate("operations and operation").0, "ops and op");
}

#[test]
fn test_abbreviate_custom_map() {
    let m = Abbreviate::new([("hello", "hi")]).unwrap();
    assert_eq!(m.len(), 1);
    assert_eq!(m.abbreviate("hello world, Hello!").0, "hi world, hi!");
}

// ========== Dictionary ==========

#[test]
fn test_codes() {
    assert_eq!(code_for(0), "$AA");
    assert_eq!(code_for(1), "$AB");
    assert_eq!(code_for(26), "$BA");
    assert_eq!(code_for(675), "$ZZ");
    assert_eq!(code_for(676), "$AAA");
}

fn repetitive() -> String {
    "the quick brown fox ".repeat(4).trim_end().to_string()
}

#[test]
fn test_codebook_needs_repeats() {
    let m = DictionaryEncode::default();
    assert!(m.build_codebook("every word here is different from the rest").is_empty());
    assert!(!m.build_codebook(&repetitive()).is_empty());
}

#[test]
fn test_codebook_phrases_do_not_contain_each_other() {
    let cb = DictionaryEncode::default().build_codebook(&repetitive());
    let phrases: Vec<&String> = cb.values().collect();
    for (i, a) in phrases.iter().enumerate() {
        for b in &phrases[i + 1..] {
            assert!(!a.contains(b.as_str()) && !b.contains(a.as_str()));
        }
    }
}

#[test]
fn test_codebook_respects_max_entries() {
    let m = DictionaryEncode { max_entries: 1, ..DictionaryEncode::default() };
    assert_eq!(m.build_codebook(&repetitive()).len(), 1);
}

#[test]
fn test_encode_decode_with_dollar() {
    let m = DictionaryEncode::default();
    let text = format!("costs $5 total: {}", repetitive());
    let cb = m.build_codebook(&text);
    let encoded = m.encode(&text, &cb).unwrap();
    assert!(encoded.len() < text.len());
    assert_eq!(decode(&encoded, &cb), text);
}

#[test]
fn test_encode_does_not_rescan_emitted_codes() {
    let phrase = "alpha bravo charlie delta echo";
    let text = format!(
        "{phrase} zzzz x1 {phrase} x2 {phrase} x3 {phrase} x4 AA zzzz y1 AA zzzz y2 AA zzzz y3"
    );
    let m = DictionaryEncode::default();
    let cb = m.build_codebook(&text);
    assert!(cb.values().any(|p| p == phrase));
    assert!(cb.values().any(|p| p == "AA zzzz"));
    let encoded = m.encode(&text, &cb).unwrap();
    assert!(!encoded.contains("$$"));
    assert_eq!(decode(&encoded, &cb), text);
}

#[test]
fn test_encode_skips_match_running_into_capital() {
    let cb: Codebook = [
        ("$AA".to_string(), "foo bar".to_string()),
        ("$AAB".to_string(), "qux quux".to_string()),
    ]
    .into_iter()
    .collect();
    let m = DictionaryEncode::default();
    let text = "foo barBaz and foo bar and qux quux";
    let encoded = m.encode(text, &cb).unwrap();
    assert_eq!(encoded, "foo barBaz and $AA and $AAB");
    assert_eq!(decode(&encoded, &cb), text);
}

#[test]
fn test_decode_leaves_unknown_codes() {
    let cb: Codebook = [("$AA".to_string(), "foo bar".to_string())].into_iter().collect();
    assert_eq!(decode("$ZZ then $AA", &cb), "$ZZ then foo bar");
}

#[tokio::test]
async fn test_dictionary_module_reports_codebook() {
    let text = repetitive();
    let out = DictionaryEncode::default().apply(&text).await.unwrap();
    let meta = out.metadata.unwrap();
    let cb = codebook_from_metadata(&meta).unwrap();
    assert_eq!(meta.get_i64("entries"), Some(cb.len() as i64));
    assert_eq!(decode(&out.text, &cb), text);
}

#[tokio::test]
async fn test_dictionary_module_no_codebook_is_noop() {
    let out = DictionaryEncode::default().apply("short text").await.unwrap();
    assert_eq!(out.text, "short text");
    assert!(out.metadata.is_none());
}

// ========== Levels ==========

#[test]
fn test_level_module_lists() {
    let names = |level: OptimizationLevel| -> Vec<String> {
        level.modules().unwrap().iter().map(|m| m.name().to_string()).collect()
    };
    assert_eq!(names(OptimizationLevel::Lossless), ["jsonl", "format", "dedup"]);
    assert_eq!(names(OptimizationLevel::Minimal), ["jsonl", "format", "dedup", "abbreviate"]);
    assert_eq!(
        names(OptimizationLevel::Balanced),
        ["jsonl", "format", "dedup", "abbreviate", "dictionary"]
    );
}

#[test]
fn test_level_parse() {
    assert_eq!("Balanced".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Balanced);
    assert!("extreme".parse::<OptimizationLevel>().is_err());
    assert_eq!(OptimizationLevel::Minimal.to_string(), "minimal");
}

#[test]
fn test_module_output_json_shape() {
    let out = ModuleOutput::new("x").with_metadata(tko_core::EntryMetadata::new().with("k", 1));
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["text"], "x");
    assert_eq!(json["metadata"]["k"], 1);
    let bare = serde_json::to_value(ModuleOutput::new("y")).unwrap();
    assert!(bare.get("metadata").is_none());
}
