//! Data models for the HTTP API

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// API error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Standard error codes
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const BUDGET_EXCEEDED: &str = "BUDGET_EXCEEDED";
    pub const GENERATION_FAILED: &str = "GENERATION_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Direct question answering over inline context
///
/// POST /api/v1/answer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub query: String,
    #[serde(default)]
    pub context: String,
    /// Override for the generation token reserve.
    #[serde(default)]
    pub generation_reserve: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub answer: String,
    pub chunks_planned: usize,
    pub chunks_answered: usize,
    pub compressed: bool,
    pub low_budget: bool,
}

/// Session creation
///
/// POST /api/v1/sessions
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The question or task the generated content should address.
    #[serde(default)]
    pub instructions: String,
    /// Task labels to run, e.g. ["answer", "summary"].
    #[serde(default)]
    pub generation_list: Vec<String>,
    #[serde(default)]
    pub config_map: IndexMap<String, serde_json::Value>,
}

/// Kick off generation for a stored session
///
/// POST /api/v1/generate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub session_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub session_id: String,
    pub status: String,
}

/// Query parameters for file upload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    pub file_name: String,
    /// Overrides the Content-Type header when present.
    #[serde(default)]
    pub content_type: Option<String>,
}
