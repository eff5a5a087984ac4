//! Token-budget answer engine: estimation, planning, compression,
//! synthesis and orchestration.

pub mod compressor;
pub mod estimator;
pub mod orchestrator;
pub mod planner;
pub mod synthesizer;

pub use compressor::{CompressionOutcome, ContextCompressor, SliceSpec};
pub use estimator::{TokenEstimator, TokenizerEstimator, WordHeuristicEstimator};
pub use orchestrator::{AnswerEngine, EngineAnswer};
pub use planner::{Chunk, ChunkPlan, ChunkPlanner, TokenBudget, PROMPT_OVERHEAD};
pub use synthesizer::{AnswerOutput, AnswerSynthesizer};
