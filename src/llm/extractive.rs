//! Deterministic extractive backends.
//!
//! Used when no remote endpoint is configured. They answer and summarize
//! by copying leading sentences out of the source text, which keeps the
//! whole pipeline exercisable offline with stable output.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::llm::model::{
    BackendError, GenerationRequest, GenerationStats, SliceSummarizer, SummaryRequest,
    TextGenerator,
};

/// Rough tokens-per-word ratio used to turn a token ceiling into a word
/// ceiling.
const TOKENS_PER_WORD: f64 = 1.3;

const NO_CONTEXT_ANSWER: &str =
    "The provided material does not contain enough information to answer this question.";

fn word_budget(max_new_tokens: usize) -> usize {
    ((max_new_tokens as f64) / TOKENS_PER_WORD).floor().max(1.0) as usize
}

/// Split text into sentence-ish pieces, keeping the terminator attached.
fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim_start)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Take leading sentences of `text` until `max_words` is reached. Falls
/// back to a plain word prefix when the text has no sentence boundary.
fn leading_sentences(text: &str, max_words: usize) -> String {
    let mut out = String::new();
    let mut words = 0;
    for sentence in split_sentences(text) {
        let sentence_words = sentence.split_whitespace().count();
        if words + sentence_words > max_words && words > 0 {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(sentence.trim_end());
        words += sentence_words;
        if words >= max_words {
            break;
        }
    }
    if out.is_empty() {
        out = text
            .split_whitespace()
            .take(max_words)
            .collect::<Vec<_>>()
            .join(" ");
    }
    out
}

/// Extractive question answering backend.
///
/// Reads the context portion of the prompt (everything before the
/// trailing question block) and streams its leading sentences as the
/// answer, one sentence per piece.
pub struct ExtractiveGenerator;

#[async_trait]
impl TextGenerator for ExtractiveGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
        pieces: mpsc::Sender<String>,
    ) -> Result<GenerationStats, BackendError> {
        let context = match request.prompt.rsplit_once("\n\nQuestion:") {
            Some((context, _)) => context,
            None => request.prompt.as_str(),
        };

        let answer = if context.trim().is_empty() {
            NO_CONTEXT_ANSWER.to_string()
        } else {
            leading_sentences(context, word_budget(request.max_new_tokens))
        };

        let mut stats = GenerationStats::default();
        for sentence in split_sentences(&answer) {
            stats.pieces += 1;
            let piece = if stats.pieces == 1 {
                sentence.to_string()
            } else {
                format!(" {sentence}")
            };
            if pieces.send(piece).await.is_err() {
                debug!("output receiver dropped, finishing extractive generation");
                break;
            }
        }
        Ok(stats)
    }
}

/// Extractive slice summarizer: the summary of a slice is its leading
/// sentences, capped by the requested token ceiling.
pub struct ExtractiveSummarizer;

#[async_trait]
impl SliceSummarizer for ExtractiveSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, BackendError> {
        if request.text.trim().is_empty() {
            return Ok(String::new());
        }
        let budget = word_budget(request.max_new_tokens.max(request.min_new_tokens));
        Ok(leading_sentences(&request.text, budget))
    }
}
