//! Single-prompt answer synthesis.
//!
//! Takes a fully built prompt, checks it against the model window,
//! clamps the output budget and runs the backend while holding the
//! model's exclusive permit. The backend streams into a channel from a
//! spawned worker; this task drains the channel so progress updates
//! flow while the model is still generating.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::llm::model::{BackendError, GenerationRequest, ModelHandle};
use crate::metrics::METRICS;
use crate::progress::ProgressHandle;

/// Channel capacity between the generation worker and the drain loop.
const PIECE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("prompt of {prompt_tokens} tokens leaves no output room in a {model_limit}-token window")]
    PromptTooLong {
        prompt_tokens: usize,
        model_limit: usize,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("generation worker failed: {0}")]
    Worker(String),
}

/// A synthesized answer with its budget accounting.
#[derive(Debug, Clone)]
pub struct AnswerOutput {
    pub text: String,
    /// Token count of the final text, per the model tokenizer.
    pub new_tokens: usize,
    /// Output ceiling actually used after window clamping.
    pub capped_at: usize,
    /// True when the ceiling fell below the answer floor.
    pub low_budget: bool,
}

/// Runs one prompt through the answer model.
pub struct AnswerSynthesizer {
    model: Arc<ModelHandle>,
    answer_floor: usize,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<ModelHandle>, answer_floor: usize) -> Self {
        Self {
            model,
            answer_floor,
        }
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Generate an answer for `prompt`, producing at most
    /// `max_new_tokens` (clamped so prompt plus output fits the
    /// window with at least one output token).
    pub async fn synthesize(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        progress: &ProgressHandle,
    ) -> Result<AnswerOutput, SynthesisError> {
        let prompt_tokens = self.model.tokenizer().count(prompt);
        let model_limit = self.model.limits().context_window;

        if prompt_tokens + 1 >= model_limit {
            return Err(SynthesisError::PromptTooLong {
                prompt_tokens,
                model_limit,
            });
        }

        let capped_at = max_new_tokens.min(model_limit - prompt_tokens - 1).max(1);
        let low_budget = capped_at < self.answer_floor;
        if low_budget {
            METRICS.low_budget_generations.inc();
            warn!(
                capped_at,
                answer_floor = self.answer_floor,
                prompt_tokens,
                "output budget fell below the answer floor"
            );
        }

        debug!(
            prompt_tokens,
            capped_at,
            model = self.model.name(),
            "synthesizing answer"
        );

        let timer = METRICS.generation_duration.start_timer();
        let _permit = self.model.acquire().await?;

        let (tx, mut rx) = mpsc::channel(PIECE_CHANNEL_CAPACITY);
        let backend = self.model.backend();
        let request = GenerationRequest::answer(prompt, capped_at);
        let worker = tokio::spawn(async move { backend.generate(request, tx).await });

        let mut text = String::new();
        while let Some(piece) = rx.recv().await {
            progress.record_pieces(1);
            text.push_str(&piece);
        }

        let stats = worker
            .await
            .map_err(|e| SynthesisError::Worker(e.to_string()))??;
        timer.observe_duration();

        let text = text.trim().to_string();
        let new_tokens = self.model.tokenizer().count(&text);
        METRICS.generated_tokens.observe(new_tokens as f64);
        debug!(
            pieces = stats.pieces,
            new_tokens, "generation finished"
        );

        Ok(AnswerOutput {
            text,
            new_tokens,
            capped_at,
            low_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::llm::extractive::ExtractiveGenerator;
    use crate::llm::model::{GenerationStats, ModelLimits, TextGenerator};
    use crate::llm::tokenizer::{TextTokenizer, TiktokenTokenizer};
    use crate::progress::ProgressTracker;

    fn handle(backend: Arc<dyn TextGenerator>, window: usize) -> Arc<ModelHandle> {
        let tokenizer: Arc<dyn TextTokenizer> =
            Arc::new(TiktokenTokenizer::from_encoding("r50k_base").unwrap());
        Arc::new(ModelHandle::new(
            "test-generator",
            tokenizer,
            backend,
            ModelLimits {
                context_window: window,
            },
        ))
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            _pieces: mpsc::Sender<String>,
        ) -> Result<GenerationStats, BackendError> {
            Err(BackendError::Api("scripted failure".to_string()))
        }
    }

    #[tokio::test]
    async fn synthesizes_an_answer() {
        let synthesizer = AnswerSynthesizer::new(handle(Arc::new(ExtractiveGenerator), 512), 50);
        let prompt = "Mitosis has four phases.\n\nQuestion: How many phases?\nAnswer:";
        let out = synthesizer
            .synthesize(prompt, 128, &ProgressHandle::disabled())
            .await
            .unwrap();
        assert!(!out.text.is_empty());
        assert!(out.new_tokens > 0);
        assert!(!out.low_budget);
    }

    #[tokio::test]
    async fn rejects_prompt_that_fills_the_window() {
        let synthesizer = AnswerSynthesizer::new(handle(Arc::new(ExtractiveGenerator), 16), 50);
        let prompt = "word ".repeat(64);
        let err = synthesizer
            .synthesize(&prompt, 128, &ProgressHandle::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::PromptTooLong { .. }));
    }

    #[tokio::test]
    async fn clamps_output_to_remaining_window() {
        let synthesizer = AnswerSynthesizer::new(handle(Arc::new(ExtractiveGenerator), 64), 50);
        let prompt = "Plants need light.\n\nQuestion: What do plants need?\nAnswer:";
        let prompt_tokens = synthesizer.model().tokenizer().count(prompt);
        let out = synthesizer
            .synthesize(prompt, 10_000, &ProgressHandle::disabled())
            .await
            .unwrap();
        assert_eq!(out.capped_at, 64 - prompt_tokens - 1);
        assert!(out.low_budget); // remaining room is below the 50-token floor
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let synthesizer = AnswerSynthesizer::new(handle(Arc::new(FailingGenerator), 512), 50);
        let err = synthesizer
            .synthesize("prompt\n\nQuestion: q\nAnswer:", 64, &ProgressHandle::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Backend(_)));
    }

    #[tokio::test]
    async fn streams_pieces_into_progress() {
        let tracker = Arc::new(ProgressTracker::new());
        let progress = tracker.start("synth-progress");
        let synthesizer = AnswerSynthesizer::new(handle(Arc::new(ExtractiveGenerator), 512), 50);
        let prompt =
            "Rivers erode rock. Sediment settles downstream.\n\nQuestion: What erodes rock?\nAnswer:";
        synthesizer
            .synthesize(prompt, 64, &progress)
            .await
            .unwrap();
        assert!(tracker.get("synth-progress").unwrap().generated_pieces > 0);
    }
}
