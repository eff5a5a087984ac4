//! Token counting strategies

use std::sync::Arc;

use crate::llm::tokenizer::TextTokenizer;

/// Pluggable token counting strategy.
pub trait TokenEstimator: Send + Sync {
    /// Number of tokens in `text`.
    fn estimate(&self, text: &str) -> usize;

    /// Counts for several texts at once.
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Exact estimator backed by a model tokenizer. Counts are the real
/// token counts the budget arithmetic runs on.
pub struct TokenizerEstimator {
    tokenizer: Arc<dyn TextTokenizer>,
}

impl TokenizerEstimator {
    pub fn new(tokenizer: Arc<dyn TextTokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl TokenEstimator for TokenizerEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }
}

/// Heuristic fallback assuming roughly 1.3 tokens per whitespace word.
pub struct WordHeuristicEstimator {
    tokens_per_word: f64,
}

impl WordHeuristicEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordHeuristicEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator for WordHeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }
}
