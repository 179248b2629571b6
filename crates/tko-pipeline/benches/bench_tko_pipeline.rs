use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tko_pipeline::{OptimizationLevel, OptimizationPipeline};
use tko_tokens::HeuristicTokenizer;

fn prose(size_kb: usize) -> String {
    let mut rng = rand::thread_rng();
    let sentences = [
        "The configuration of the database repository changed. ",
        "Each function takes a parameter and returns a response. ",
        "The quick brown fox jumps over the lazy dog. ",
        "Deploy the application to the production environment. ",
        "\n\n",
    ];
    let mut text = String::with_capacity(size_kb * 1024);
    while text.len() < size_kb * 1024 {
        text.push_str(sentences.choose(&mut rng).copied().unwrap_or_default());
    }
    text
}

fn transcript(size_kb: usize) -> String {
    let mut lines = Vec::new();
    let mut total = 0;
    let mut i = 0;
    while total < size_kb * 1024 {
        let line = format!(
            r#"{{"id":"{i}","role":"user","content":"message {i}","timestamp":"2026-01-15T10:00:00Z","trace_id":null}}"#
        );
        total += line.len() + 1;
        lines.push(line);
        i += 1;
    }
    lines.join("\n")
}

fn bench_presets(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let text = prose(10);
    for level in [OptimizationLevel::Lossless, OptimizationLevel::Minimal, OptimizationLevel::Balanced] {
        let pipeline = OptimizationPipeline::preset(level, Arc::new(HeuristicTokenizer)).unwrap();
        c.bench_function(&format!("optimize_{level}_10kb"), |b| {
            b.iter(|| rt.block_on(pipeline.optimize(black_box(&text))).unwrap())
        });
    }
}

fn bench_transcript(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let text = transcript(10);
    let pipeline = OptimizationPipeline::preset(OptimizationLevel::Lossless, Arc::new(HeuristicTokenizer)).unwrap();
    c.bench_function("optimize_jsonl_10kb", |b| {
        b.iter(|| rt.block_on(pipeline.optimize(black_box(&text))).unwrap())
    });
}

criterion_group!(benches, bench_presets, bench_transcript);
criterion_main!(benches);
