//! Answer orchestration across compression and chunking.
//!
//! Decision flow for a query over arbitrary-length context: when the
//! context fits the input budget, answer in one shot. When it is
//! oversized, condense it first; if the condensed text fits, one shot,
//! otherwise split it into budget-sized chunks, answer each chunk
//! independently and join the partial answers. Chunk failures are
//! logged and skipped; the run fails only when no chunk answers.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::compressor::{CompressionError, ContextCompressor, SliceSpec};
use crate::engine::estimator::{TokenEstimator, TokenizerEstimator};
use crate::engine::planner::{BudgetError, ChunkPlanner, TokenBudget};
use crate::engine::synthesizer::{AnswerSynthesizer, SynthesisError};
use crate::llm::model::{ModelHandle, SummarizerHandle};
use crate::metrics::METRICS;
use crate::progress::ProgressHandle;

/// Separator between stitched partial answers.
pub const PARTIAL_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("no answer produced: all {chunks} chunks failed")]
    NoAnswerProduced { chunks: usize },

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// A finished answer with its run accounting.
#[derive(Debug, Clone)]
pub struct EngineAnswer {
    pub text: String,
    pub chunks_planned: usize,
    pub chunks_answered: usize,
    /// Whether the context went through condensation first.
    pub compressed: bool,
    /// True when any generation call ran under the answer floor.
    pub low_budget: bool,
}

/// Build the generation prompt from context material and a query.
pub(crate) fn build_prompt(context: &str, query: &str) -> String {
    format!("{context}\n\nQuestion: {query}\nAnswer:")
}

/// Query answering over arbitrary-length context.
pub struct AnswerEngine {
    generator: Arc<ModelHandle>,
    synthesizer: AnswerSynthesizer,
    compressor: ContextCompressor,
    summary_spec: SliceSpec,
    default_reserve: usize,
}

impl AnswerEngine {
    pub fn new(
        generator: Arc<ModelHandle>,
        summarizer: Arc<SummarizerHandle>,
        config: &Config,
    ) -> Self {
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(TokenizerEstimator::new(Arc::clone(generator.tokenizer())));
        let compressor = ContextCompressor::new(
            estimator,
            summarizer,
            SliceSpec::condense(&config.compression),
            config.generator.max_input_tokens(),
        );
        let synthesizer =
            AnswerSynthesizer::new(Arc::clone(&generator), config.generator.answer_floor);

        Self {
            generator,
            synthesizer,
            compressor,
            summary_spec: SliceSpec::document_summary(&config.summary),
            default_reserve: config.generator.generation_reserve,
        }
    }

    /// Answer `query` over `context` with the configured reserve.
    pub async fn answer(
        &self,
        query: &str,
        context: &str,
        progress: &ProgressHandle,
    ) -> Result<EngineAnswer, AnswerError> {
        self.answer_with_reserve(query, context, self.default_reserve, progress)
            .await
    }

    pub async fn answer_with_reserve(
        &self,
        query: &str,
        context: &str,
        generation_reserve: usize,
        progress: &ProgressHandle,
    ) -> Result<EngineAnswer, AnswerError> {
        progress.set_stage("generating", "answer");

        // Condensation is best effort. When every slice fails we still
        // have the raw context, and chunked answering handles any size.
        let (context_text, compressed) = match self.compressor.compress_if_needed(context).await {
            Ok(outcome) => (outcome.text, outcome.compressed),
            Err(e) => {
                warn!("context compression failed, falling back to chunked answering: {}", e);
                (context.to_string(), false)
            }
        };

        let context_tokens = self.generator.tokenizer().count(&context_text);
        if context_tokens <= self.compressor.input_threshold() {
            let prompt = build_prompt(&context_text, query);
            let window = self.generator.limits().context_window;
            match self.synthesizer.synthesize(&prompt, window, progress).await {
                Ok(out) if !out.text.is_empty() => {
                    METRICS.record_generation("single", true);
                    return Ok(EngineAnswer {
                        text: out.text,
                        chunks_planned: 1,
                        chunks_answered: 1,
                        compressed,
                        low_budget: out.low_budget,
                    });
                }
                Ok(_) => {
                    METRICS.record_generation("single", false);
                    return Err(AnswerError::NoAnswerProduced { chunks: 1 });
                }
                Err(SynthesisError::PromptTooLong {
                    prompt_tokens,
                    model_limit,
                }) => {
                    // The query itself can blow the window even when the
                    // context fits; the planner below charges it against
                    // the budget properly.
                    debug!(
                        prompt_tokens,
                        model_limit, "single-shot prompt overflow, switching to chunks"
                    );
                }
                Err(e) => {
                    METRICS.record_generation("single", false);
                    return Err(e.into());
                }
            }
        }

        self.chunked(query, &context_text, generation_reserve, compressed, progress)
            .await
    }

    /// Chunked answering without the compression stage, mainly for
    /// callers that already hold condensed or pre-sized text.
    pub async fn chunked_answer(
        &self,
        query: &str,
        context: &str,
        generation_reserve: usize,
        progress: &ProgressHandle,
    ) -> Result<EngineAnswer, AnswerError> {
        self.chunked(query, context, generation_reserve, false, progress)
            .await
    }

    async fn chunked(
        &self,
        query: &str,
        context: &str,
        generation_reserve: usize,
        compressed: bool,
        progress: &ProgressHandle,
    ) -> Result<EngineAnswer, AnswerError> {
        let budget = TokenBudget::new(self.generator.limits().context_window, generation_reserve);
        let planner = ChunkPlanner::new(Arc::clone(self.generator.tokenizer()), budget);
        let plan = planner.plan_text(context, query)?;

        METRICS.chunks_planned.observe(plan.chunks.len() as f64);
        progress.set_total_chunks(plan.chunks.len());
        info!(
            chunks = plan.chunks.len(),
            window = plan.window,
            "answering in chunks"
        );

        let mut partials: Vec<String> = Vec::new();
        let mut low_budget = false;
        for chunk in &plan.chunks {
            let prompt = build_prompt(&chunk.text, query);
            match self
                .synthesizer
                .synthesize(&prompt, generation_reserve, progress)
                .await
            {
                Ok(out) => {
                    low_budget |= out.low_budget;
                    if out.text.is_empty() {
                        METRICS.chunk_failures.inc();
                        warn!(chunk = chunk.index, "chunk produced an empty answer");
                    } else {
                        partials.push(out.text);
                    }
                }
                Err(e) => {
                    METRICS.chunk_failures.inc();
                    warn!(chunk = chunk.index, "chunk answer failed: {}", e);
                }
            }
            progress.chunk_done();
        }

        if partials.is_empty() {
            METRICS.record_generation("chunk", false);
            return Err(AnswerError::NoAnswerProduced {
                chunks: plan.chunks.len(),
            });
        }

        METRICS.record_generation("chunk", true);
        Ok(EngineAnswer {
            text: partials.join(PARTIAL_SEPARATOR),
            chunks_planned: plan.chunks.len(),
            chunks_answered: partials.len(),
            compressed,
            low_budget,
        })
    }

    /// Standalone document summary: slice the text and join the slice
    /// summaries as visible sections.
    pub async fn summarize_document(
        &self,
        text: &str,
        progress: &ProgressHandle,
    ) -> Result<String, CompressionError> {
        progress.set_stage("generating", "summary");
        self.compressor
            .summarize_slices(text, &self.summary_spec)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    use crate::llm::model::{
        BackendError, GenerationRequest, GenerationStats, ModelLimits, SliceSummarizer,
        SummaryRequest, TextGenerator,
    };
    use crate::llm::runtime::{build_generator, build_summarizer};
    use crate::llm::tokenizer::{TextTokenizer, TiktokenTokenizer};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.generator.context_window = 128;
        config.generator.generation_reserve = 40;
        config.generator.answer_floor = 5;
        config.compression.slice_tokens = 32;
        config.compression.summary_min_tokens = 2;
        config.compression.summary_max_tokens = 16;
        config.summary.slice_tokens = 32;
        config.summary.min_tokens = 2;
        config.summary.max_tokens = 16;
        config
    }

    fn engine(config: &Config) -> AnswerEngine {
        let generator = build_generator(&config.generator).unwrap();
        let summarizer = build_summarizer(&config.summarizer).unwrap();
        AnswerEngine::new(generator, summarizer, config)
    }

    fn engine_with_generator(config: &Config, backend: Arc<dyn TextGenerator>) -> AnswerEngine {
        let tokenizer: Arc<dyn TextTokenizer> =
            Arc::new(TiktokenTokenizer::from_encoding(&config.generator.encoding).unwrap());
        let generator = Arc::new(ModelHandle::new(
            "scripted",
            tokenizer,
            backend,
            ModelLimits {
                context_window: config.generator.context_window,
            },
        ));
        let summarizer = build_summarizer(&config.summarizer).unwrap();
        AnswerEngine::new(generator, summarizer, config)
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

    struct FailingSummarizer;

    #[async_trait]
    impl SliceSummarizer for FailingSummarizer {
        async fn summarize(&self, _request: SummaryRequest) -> Result<String, BackendError> {
            Err(BackendError::Api("scripted failure".to_string()))
        }
    }

    /// Fails the first `failures` calls, then answers with a fixed
    /// sentence.
    struct FlakyGenerator {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl TextGenerator for FlakyGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            pieces: mpsc::Sender<String>,
        ) -> Result<GenerationStats, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(BackendError::Api("scripted failure".to_string()));
            }
            let _ = pieces.send("A partial answer.".to_string()).await;
            Ok(GenerationStats { pieces: 1 })
        }
    }

    #[tokio::test]
    async fn small_context_answers_in_one_shot() {
        let config = small_config();
        let engine = engine(&config);
        let answer = engine
            .answer(
                "What erodes rock?",
                "Rivers erode rock over centuries.",
                &ProgressHandle::disabled(),
            )
            .await
            .unwrap();
        assert_eq!(answer.chunks_planned, 1);
        assert_eq!(answer.chunks_answered, 1);
        assert!(!answer.compressed);
        assert!(!answer.text.is_empty());
    }

    #[tokio::test]
    async fn empty_context_still_answers() {
        let config = small_config();
        let engine = engine(&config);
        let answer = engine
            .answer("What is due tomorrow?", "", &ProgressHandle::disabled())
            .await
            .unwrap();
        assert!(!answer.text.is_empty());
        assert_eq!(answer.chunks_planned, 1);
    }

    #[tokio::test]
    async fn oversized_context_is_compressed_or_chunked() {
        let config = small_config();
        let engine = engine(&config);
        let context = "Glaciers carve valleys. Wind shapes dunes. Waves cut cliffs. "
            .repeat(30);
        let answer = engine
            .answer("What shapes dunes?", &context, &ProgressHandle::disabled())
            .await
            .unwrap();
        assert!(!answer.text.is_empty());
        assert!(answer.compressed || answer.chunks_planned > 1);
    }

    #[tokio::test]
    async fn failed_chunks_are_skipped() {
        let config = small_config();
        let backend = Arc::new(FlakyGenerator {
            calls: AtomicUsize::new(0),
            failures: 1,
        });
        let engine = engine_with_generator(&config, backend);
        let context = "The alphabet has letters. ".repeat(60);
        let answer = engine
            .chunked_answer(
                "How many letters?",
                &context,
                40,
                &ProgressHandle::disabled(),
            )
            .await
            .unwrap();
        assert!(answer.chunks_planned > 1);
        assert_eq!(answer.chunks_answered, answer.chunks_planned - 1);
        assert!(answer.text.contains("A partial answer."));
    }

    #[tokio::test]
    async fn all_chunks_failing_is_an_error() {
        let config = small_config();
        let engine = engine_with_generator(&config, Arc::new(FailingGenerator));
        let context = "Facts and more facts. ".repeat(60);
        let err = engine
            .chunked_answer("Any facts?", &context, 40, &ProgressHandle::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::NoAnswerProduced { chunks } if chunks > 1));
    }

    #[tokio::test]
    async fn oversized_query_is_a_budget_error() {
        let config = small_config();
        let engine = engine(&config);
        let query = "why ".repeat(200);
        let err = engine
            .answer(&query, "Tiny context.", &ProgressHandle::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::Budget(BudgetError::Exceeded { .. })));
    }

    #[tokio::test]
    async fn compression_failure_falls_back_to_chunks() {
        let mut config = small_config();
        config.generator.answer_floor = 5;
        let tokenizer: Arc<dyn TextTokenizer> =
            Arc::new(TiktokenTokenizer::from_encoding(&config.summarizer.encoding).unwrap());
        let summarizer = Arc::new(SummarizerHandle::new(
            "failing",
            tokenizer,
            Arc::new(FailingSummarizer),
            ModelLimits {
                context_window: config.summarizer.context_window,
            },
        ));
        let generator = build_generator(&config.generator).unwrap();
        let engine = AnswerEngine::new(generator, summarizer, &config);

        let context = "Volcanoes build islands. Lava cools into rock. ".repeat(40);
        let answer = engine
            .answer("What builds islands?", &context, &ProgressHandle::disabled())
            .await
            .unwrap();
        assert!(!answer.compressed);
        assert!(answer.chunks_planned > 1);
        assert!(!answer.text.is_empty());
    }

    #[tokio::test]
    async fn document_summary_uses_section_separators() {
        let config = small_config();
        let engine = engine(&config);
        let text = "Cells are the unit of life. Tissues build organs. Organs build systems. "
            .repeat(20);
        let summary = engine
            .summarize_document(&text, &ProgressHandle::disabled())
            .await
            .unwrap();
        assert!(!summary.is_empty());
        assert!(summary.contains("\n\n"));
    }
}
