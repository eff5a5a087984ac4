//! Service configuration.
//!
//! Loaded from a TOML file plus `STUDY_ENGINE__*` environment overrides.
//! Every field has a default so an empty file (or no file at all) yields
//! a runnable offline configuration.

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::EngineError;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub summarizer: SummarizerModelConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub summary: SummaryTaskConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from `STUDY_ENGINE_CONFIG` (default `config/study-engine.toml`,
    /// missing file allowed) with environment overrides applied on top.
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var("STUDY_ENGINE_CONFIG")
            .unwrap_or_else(|_| "config/study-engine.toml".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("STUDY_ENGINE").separator("__"))
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file, which must exist.
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.generator.generation_reserve >= self.generator.context_window {
            return Err(EngineError::Configuration(format!(
                "generator.generation_reserve ({}) must be below generator.context_window ({})",
                self.generator.generation_reserve, self.generator.context_window
            )));
        }
        if self.compression.slice_tokens == 0 || self.summary.slice_tokens == 0 {
            return Err(EngineError::Configuration(
                "slice_tokens must be positive".to_string(),
            ));
        }
        if self.compression.summary_max_tokens < self.compression.summary_min_tokens {
            return Err(EngineError::Configuration(
                "compression.summary_max_tokens must be >= summary_min_tokens".to_string(),
            ));
        }
        if self.summary.max_tokens < self.summary.min_tokens {
            return Err(EngineError::Configuration(
                "summary.max_tokens must be >= summary.min_tokens".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body cap in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// API authentication settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Key required by the generation endpoint. When unset, no key is
    /// checked.
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

/// Answer model settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Tokenizer encoding name.
    #[serde(default = "default_generator_encoding")]
    pub encoding: String,

    /// Model context window in tokens, prompt plus output.
    #[serde(default = "default_generator_window")]
    pub context_window: usize,

    /// Tokens held back from the prompt for the answer.
    #[serde(default = "default_generation_reserve")]
    pub generation_reserve: usize,

    /// Output caps below this raise the low-budget warning.
    #[serde(default = "default_answer_floor")]
    pub answer_floor: usize,

    /// Remote completions endpoint. Unset means the offline extractive
    /// backend.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_generator_encoding() -> String {
    "r50k_base".to_string()
}

fn default_generator_window() -> usize {
    2048
}

fn default_generation_reserve() -> usize {
    150
}

fn default_answer_floor() -> usize {
    50
}

fn default_generator_model() -> String {
    "gpt-neo-125m".to_string()
}

fn default_generator_timeout() -> u64 {
    120
}

fn default_max_retries() -> usize {
    3
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            encoding: default_generator_encoding(),
            context_window: default_generator_window(),
            generation_reserve: default_generation_reserve(),
            answer_floor: default_answer_floor(),
            endpoint: None,
            api_key: None,
            model: default_generator_model(),
            timeout_secs: default_generator_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl GeneratorConfig {
    /// Largest prompt the model accepts once the answer reserve is held
    /// back.
    pub fn max_input_tokens(&self) -> usize {
        self.context_window.saturating_sub(self.generation_reserve)
    }
}

/// Summarization model settings
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerModelConfig {
    #[serde(default = "default_summarizer_encoding")]
    pub encoding: String,

    #[serde(default = "default_summarizer_window")]
    pub context_window: usize,

    /// Remote chat-completions endpoint. Unset means the offline
    /// extractive backend.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_summarizer_model")]
    pub model: String,

    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_summarizer_encoding() -> String {
    "r50k_base".to_string()
}

fn default_summarizer_window() -> usize {
    1024
}

fn default_summarizer_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_summarizer_timeout() -> u64 {
    30
}

impl Default for SummarizerModelConfig {
    fn default() -> Self {
        Self {
            encoding: default_summarizer_encoding(),
            context_window: default_summarizer_window(),
            endpoint: None,
            api_key: None,
            model: default_summarizer_model(),
            timeout_secs: default_summarizer_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Oversized-context condensation settings for the answer path
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    /// Slice size fed to the summarizer, in summarizer tokens.
    #[serde(default = "default_compression_slice_tokens")]
    pub slice_tokens: usize,

    #[serde(default = "default_compression_min_tokens")]
    pub summary_min_tokens: usize,

    #[serde(default = "default_compression_max_tokens")]
    pub summary_max_tokens: usize,
}

fn default_compression_slice_tokens() -> usize {
    800
}

fn default_compression_min_tokens() -> usize {
    60
}

fn default_compression_max_tokens() -> usize {
    200
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            slice_tokens: default_compression_slice_tokens(),
            summary_min_tokens: default_compression_min_tokens(),
            summary_max_tokens: default_compression_max_tokens(),
        }
    }
}

/// Standalone document-summary task settings
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryTaskConfig {
    #[serde(default = "default_summary_slice_tokens")]
    pub slice_tokens: usize,

    #[serde(default = "default_summary_min_tokens")]
    pub min_tokens: usize,

    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: usize,
}

fn default_summary_slice_tokens() -> usize {
    600
}

fn default_summary_min_tokens() -> usize {
    60
}

fn default_summary_max_tokens() -> usize {
    250
}

impl Default for SummaryTaskConfig {
    fn default() -> Self {
        Self {
            slice_tokens: default_summary_slice_tokens(),
            min_tokens: default_summary_min_tokens(),
            max_tokens: default_summary_max_tokens(),
        }
    }
}

/// File extraction settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Remote OCR endpoint for image files.
    #[serde(default)]
    pub ocr_endpoint: Option<String>,

    /// Remote transcription endpoint for audio files.
    #[serde(default)]
    pub transcriber_endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_extraction_retries")]
    pub max_retries: usize,

    /// Extracted-text cache entries, keyed by blob id.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_extraction_timeout() -> u64 {
    30
}

fn default_extraction_retries() -> usize {
    2
}

fn default_cache_capacity() -> u64 {
    256
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ocr_endpoint: None,
            transcriber_endpoint: None,
            api_key: None,
            timeout_secs: default_extraction_timeout(),
            max_retries: default_extraction_retries(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
