//! Benchmarks for tokenization and chunk planning over long documents.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use study_engine::engine::planner::{ChunkPlanner, TokenBudget};
use study_engine::llm::{TextTokenizer, TiktokenTokenizer};

fn document(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Section {i} covers the reaction rates observed at stage {}.", i % 7))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_chunk_planning(c: &mut Criterion) {
    let tokenizer: Arc<dyn TextTokenizer> =
        Arc::new(TiktokenTokenizer::from_encoding("r50k_base").unwrap());
    let planner = ChunkPlanner::new(Arc::clone(&tokenizer), TokenBudget::new(2048, 150));

    let mut group = c.benchmark_group("plan_text");
    for &sentences in &[200usize, 1000, 4000] {
        let text = document(sentences);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sentences), &text, |b, text| {
            b.iter(|| {
                planner
                    .plan_text(black_box(text), "What changed between stages?")
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_token_counting(c: &mut Criterion) {
    let tokenizer = TiktokenTokenizer::from_encoding("r50k_base").unwrap();
    let text = document(1000);

    c.bench_function("token_count_1000_sentences", |b| {
        b.iter(|| tokenizer.count(black_box(&text)))
    });
}

criterion_group!(benches, bench_chunk_planning, bench_token_counting);
criterion_main!(benches);
