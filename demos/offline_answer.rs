//! Example: answering a question over a document longer than the model
//! window, fully offline on the extractive backends.
//!
//! Run with: cargo run --example offline_answer

use study_engine::config::Config;
use study_engine::engine::AnswerEngine;
use study_engine::llm::runtime::{build_generator, build_summarizer};
use study_engine::progress::ProgressHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // A small window makes the chunking visible even for a modest text.
    let mut config = Config::default();
    config.generator.context_window = 512;
    config.generator.generation_reserve = 96;

    let generator = build_generator(&config.generator)?;
    let summarizer = build_summarizer(&config.summarizer)?;
    let engine = AnswerEngine::new(generator, summarizer, &config);

    let document = (0..400)
        .map(|i| {
            format!(
                "Observation {i}: the sample held at {} degrees stayed stable.",
                20 + i % 60
            )
        })
        .collect::<Vec<_>>()
        .join(" ");

    let answer = engine
        .answer(
            "Which samples stayed stable?",
            &document,
            &ProgressHandle::disabled(),
        )
        .await?;

    println!(
        "answered over {} chunk(s), compressed first: {}",
        answer.chunks_planned, answer.compressed
    );
    println!("{}", answer.text);

    Ok(())
}
