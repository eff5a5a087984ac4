//! Context compression through slice summarization.
//!
//! Oversized text is cut into fixed-size token slices, each slice is
//! summarized independently, and the partial summaries are joined back
//! together. A failed slice is logged and skipped; the run only fails
//! when every slice fails. Compression is best effort: the caller
//! re-checks the result against its budget and falls back to chunked
//! answering when the condensed text is still too large.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CompressionConfig, SummaryTaskConfig};
use crate::engine::estimator::TokenEstimator;
use crate::engine::planner::PROMPT_OVERHEAD;
use crate::llm::model::{SummaryRequest, SummarizerHandle};
use crate::metrics::METRICS;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("all {slices} slices failed to summarize")]
    AllSlicesFailed { slices: usize },
}

/// Slicing and output bounds for one summarization pass.
#[derive(Debug, Clone)]
pub struct SliceSpec {
    /// Slice size in summarizer tokens.
    pub slice_tokens: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    /// Separator between partial summaries.
    pub joiner: &'static str,
}

impl SliceSpec {
    /// Answer-path condensation: partials flow into one prompt, so they
    /// are joined with a single space.
    pub fn condense(config: &CompressionConfig) -> Self {
        Self {
            slice_tokens: config.slice_tokens,
            min_tokens: config.summary_min_tokens,
            max_tokens: config.summary_max_tokens,
            joiner: " ",
        }
    }

    /// Standalone document summary: partials remain visible sections,
    /// separated by blank lines.
    pub fn document_summary(config: &SummaryTaskConfig) -> Self {
        Self {
            slice_tokens: config.slice_tokens,
            min_tokens: config.min_tokens,
            max_tokens: config.max_tokens,
            joiner: "\n\n",
        }
    }
}

/// Result of [`ContextCompressor::compress_if_needed`].
#[derive(Debug)]
pub struct CompressionOutcome {
    pub text: String,
    pub compressed: bool,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Condenses text that overflows the answer model's input budget.
pub struct ContextCompressor {
    estimator: Arc<dyn TokenEstimator>,
    summarizer: Arc<SummarizerHandle>,
    condense: SliceSpec,
    /// Input sizes at or below this pass through untouched, counted in
    /// answer-model tokens.
    input_threshold: usize,
}

impl ContextCompressor {
    pub fn new(
        estimator: Arc<dyn TokenEstimator>,
        summarizer: Arc<SummarizerHandle>,
        condense: SliceSpec,
        input_threshold: usize,
    ) -> Self {
        Self {
            estimator,
            summarizer,
            condense,
            input_threshold,
        }
    }

    pub fn input_threshold(&self) -> usize {
        self.input_threshold
    }

    /// Pass small inputs through; condense oversized ones.
    ///
    /// The condensed text is not guaranteed to fit the threshold, so
    /// callers must re-check `output_tokens` before building a prompt
    /// from it.
    pub async fn compress_if_needed(
        &self,
        text: &str,
    ) -> Result<CompressionOutcome, CompressionError> {
        let input_tokens = self.estimator.estimate(text);
        if input_tokens <= self.input_threshold {
            debug!(
                input_tokens,
                threshold = self.input_threshold,
                "context fits the input budget, skipping compression"
            );
            METRICS.record_compression("skipped");
            return Ok(CompressionOutcome {
                text: text.to_string(),
                compressed: false,
                input_tokens,
                output_tokens: input_tokens,
            });
        }

        info!(
            input_tokens,
            threshold = self.input_threshold,
            "condensing oversized context"
        );
        let condensed = self.summarize_slices(text, &self.condense).await?;
        let output_tokens = self.estimator.estimate(&condensed);
        if output_tokens > self.input_threshold {
            warn!(
                output_tokens,
                threshold = self.input_threshold,
                "condensed context still exceeds the input budget"
            );
        }
        METRICS.record_compression("compressed");

        Ok(CompressionOutcome {
            text: condensed,
            compressed: true,
            input_tokens,
            output_tokens,
        })
    }

    /// Slice `text` by the summarizer's tokenizer and summarize each
    /// slice. Empty input has no slices and therefore fails.
    pub async fn summarize_slices(
        &self,
        text: &str,
        spec: &SliceSpec,
    ) -> Result<String, CompressionError> {
        let tokenizer = self.summarizer.tokenizer();
        let window_cap = self
            .summarizer
            .limits()
            .context_window
            .saturating_sub(PROMPT_OVERHEAD)
            .max(1);
        let slice_len = spec.slice_tokens.min(window_cap).max(1);

        let ids = tokenizer.encode(text);
        let mut partials: Vec<String> = Vec::new();
        let mut attempted = 0usize;
        let mut cursor = 0usize;

        while cursor < ids.len() {
            let slice_index = attempted;
            attempted += 1;

            let mut end = (cursor + slice_len).min(ids.len());
            let mut forward_probes = 0;
            let slice_text = loop {
                match tokenizer.decode(&ids[cursor..end]) {
                    Ok(text) => break Some(text),
                    Err(_) if end < ids.len() && forward_probes < 4 => {
                        end += 1;
                        forward_probes += 1;
                    }
                    Err(e) => {
                        warn!(slice = slice_index, "failed to decode slice: {}", e);
                        break None;
                    }
                }
            };

            if let Some(slice_text) = slice_text {
                let request = SummaryRequest {
                    text: slice_text,
                    min_new_tokens: spec.min_tokens,
                    max_new_tokens: spec.max_tokens,
                };
                match self.summarizer.summarize(request).await {
                    Ok(summary) if !summary.trim().is_empty() => {
                        METRICS.record_compression_slice("ok");
                        partials.push(summary.trim().to_string());
                    }
                    Ok(_) => {
                        METRICS.record_compression_slice("empty");
                        warn!(slice = slice_index, "summarizer returned an empty slice");
                    }
                    Err(e) => {
                        METRICS.record_compression_slice("failed");
                        warn!(slice = slice_index, "slice summarization failed: {}", e);
                    }
                }
            } else {
                METRICS.record_compression_slice("failed");
            }

            cursor = end;
        }

        if partials.is_empty() {
            return Err(CompressionError::AllSlicesFailed { slices: attempted });
        }

        debug!(
            slices = attempted,
            summarized = partials.len(),
            "joined slice summaries"
        );
        Ok(partials.join(spec.joiner))
    }
}
