//! Model access: tokenizers, backends and handles.

pub mod extractive;
pub mod model;
pub mod remote;
pub mod runtime;
pub mod tokenizer;

pub use model::{ModelHandle, ModelLimits, SummarizerHandle};
pub use tokenizer::{TextTokenizer, TiktokenTokenizer, TokenId, TokenSequence};
