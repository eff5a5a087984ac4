//! Model backend traits and handles.
//!
//! A backend is the thing that actually produces text: a remote
//! OpenAI-compatible server in production, or a deterministic extractive
//! stand-in when no endpoint is configured. A handle pairs one backend
//! with its tokenizer, its context window and a single-permit semaphore,
//! because a generation model can only serve one request at a time and
//! everything upstream must queue rather than interleave.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore, SemaphorePermit};

use crate::llm::tokenizer::TextTokenizer;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// Hard limits of a hosted model.
#[derive(Debug, Clone, Copy)]
pub struct ModelLimits {
    /// Total tokens the model can attend to, prompt and output combined.
    pub context_window: usize,
}

/// One text generation call.
///
/// Decoding policy is fixed: greedy decoding with trigram repetition
/// blocked, so identical requests produce identical answers. Callers
/// only choose the prompt and the output ceiling.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_new_tokens: usize,
    pub no_repeat_ngram: usize,
}

impl GenerationRequest {
    pub fn answer(prompt: impl Into<String>, max_new_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens,
            no_repeat_ngram: 3,
        }
    }
}

/// One slice summarization call. Decoding is deterministic, like
/// [`GenerationRequest`].
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub text: String,
    pub min_new_tokens: usize,
    pub max_new_tokens: usize,
}

/// Counters reported by a backend after a generation call completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationStats {
    /// Number of text pieces pushed into the output channel.
    pub pieces: usize,
}

/// Streaming text generation backend.
///
/// Output is pushed piece by piece into `pieces` as it is produced; the
/// call returns once the model finishes. A dropped receiver is not an
/// error, generation runs to completion either way.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
        pieces: mpsc::Sender<String>,
    ) -> Result<GenerationStats, BackendError>;
}

/// Slice summarization backend.
#[async_trait]
pub trait SliceSummarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, BackendError>;
}

/// Generation model handle: backend, tokenizer, limits and the
/// single-request gate, built once at startup and shared.
pub struct ModelHandle {
    name: String,
    tokenizer: Arc<dyn TextTokenizer>,
    backend: Arc<dyn TextGenerator>,
    limits: ModelLimits,
    gate: Semaphore,
}

impl ModelHandle {
    pub fn new(
        name: impl Into<String>,
        tokenizer: Arc<dyn TextTokenizer>,
        backend: Arc<dyn TextGenerator>,
        limits: ModelLimits,
    ) -> Self {
        Self {
            name: name.into(),
            tokenizer,
            backend,
            limits,
            gate: Semaphore::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokenizer(&self) -> &Arc<dyn TextTokenizer> {
        &self.tokenizer
    }

    pub fn backend(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.backend)
    }

    pub fn limits(&self) -> ModelLimits {
        self.limits
    }

    /// Wait for exclusive access to the model. The permit must be held
    /// for the whole call, including draining the output stream.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, BackendError> {
        self.gate
            .acquire()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }
}

/// Summarization model handle. Serializes its own calls the same way
/// the generator handle does.
pub struct SummarizerHandle {
    name: String,
    tokenizer: Arc<dyn TextTokenizer>,
    backend: Arc<dyn SliceSummarizer>,
    limits: ModelLimits,
    gate: Semaphore,
}

impl SummarizerHandle {
    pub fn new(
        name: impl Into<String>,
        tokenizer: Arc<dyn TextTokenizer>,
        backend: Arc<dyn SliceSummarizer>,
        limits: ModelLimits,
    ) -> Self {
        Self {
            name: name.into(),
            tokenizer,
            backend,
            limits,
            gate: Semaphore::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokenizer(&self) -> &Arc<dyn TextTokenizer> {
        &self.tokenizer
    }

    pub fn limits(&self) -> ModelLimits {
        self.limits
    }

    /// Summarize one slice under the model gate.
    pub async fn summarize(&self, request: SummaryRequest) -> Result<String, BackendError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        self.backend.summarize(request).await
    }
}
