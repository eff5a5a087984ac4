//! study-engine: token-budget document Q&A and study content generation.
//!
//! The crate lets a fixed-context text generation model answer questions
//! over source material far longer than its window. Incoming text is
//! token-counted, compressed when it is moderately oversized, or split
//! into budget-sized chunks that are answered independently and stitched
//! back together. Around that core sits a small service: file extraction
//! (PDF, OCR, speech), session storage, PDF rendering of results, and an
//! HTTP API with per-session progress reporting.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod llm;
pub mod metrics;
pub mod progress;
pub mod render;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{EngineError, Result};
