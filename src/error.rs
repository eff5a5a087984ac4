//! Crate-wide error type and result alias.
//!
//! Each subsystem defines its own focused error enum; this module folds
//! them into a single `EngineError` so service-level code and the HTTP
//! layer can handle every failure through one type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Tokenizer(#[from] crate::llm::tokenizer::TokenizerError),

    #[error(transparent)]
    Backend(#[from] crate::llm::model::BackendError),

    #[error(transparent)]
    Budget(#[from] crate::engine::planner::BudgetError),

    #[error(transparent)]
    Compression(#[from] crate::engine::compressor::CompressionError),

    #[error(transparent)]
    Synthesis(#[from] crate::engine::synthesizer::SynthesisError),

    #[error(transparent)]
    Answer(#[from] crate::engine::orchestrator::AnswerError),

    #[error(transparent)]
    Extraction(#[from] crate::extract::ExtractionError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    #[error("no generation task succeeded for session {session_id}")]
    SessionFailed { session_id: String },

    #[error("internal error: {0}")]
    Internal(String),
}
