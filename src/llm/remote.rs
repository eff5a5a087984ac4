//! Remote OpenAI-compatible backends.
//!
//! The generator streams from a completions endpoint over SSE; the
//! summarizer uses non-streaming chat completions. Both retry transient
//! failures with exponential backoff before giving up.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::llm::model::{
    BackendError, GenerationRequest, GenerationStats, SliceSummarizer, SummaryRequest,
    TextGenerator,
};

/// Connection settings for one remote model endpoint.
#[derive(Debug, Clone)]
pub struct RemoteEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for RemoteEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1/completions".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }
}

/// Streaming completion client for the answer model.
pub struct CompletionStreamGenerator {
    client: Client,
    config: RemoteEndpointConfig,
}

impl CompletionStreamGenerator {
    pub fn new(config: RemoteEndpointConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Initialization(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn drain_stream(
        &self,
        response: reqwest::Response,
        pieces: &mpsc::Sender<String>,
    ) -> Result<GenerationStats, BackendError> {
        let mut stream = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        let mut non_event_body = String::new();
        let mut stats = GenerationStats::default();

        'outer: while let Some(next) = stream.next().await {
            let chunk = next.map_err(|e| BackendError::Stream(e.to_string()))?;
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_stream_line(&line) {
                    StreamEvent::Done => {
                        buf.clear();
                        break 'outer;
                    }
                    StreamEvent::Piece(text) => {
                        stats.pieces += 1;
                        if pieces.send(text).await.is_err() {
                            debug!("output receiver dropped, draining stream to completion");
                        }
                    }
                    StreamEvent::Skip => {
                        non_event_body.push_str(line.trim());
                    }
                }
            }
        }

        // Whatever follows the final newline is still a line once the
        // stream ends. Single-JSON bodies usually arrive unterminated.
        if !buf.is_empty() {
            let line = String::from_utf8_lossy(&buf);
            match parse_stream_line(&line) {
                StreamEvent::Piece(text) => {
                    stats.pieces += 1;
                    if pieces.send(text).await.is_err() {
                        debug!("output receiver dropped, draining stream to completion");
                    }
                }
                StreamEvent::Skip => {
                    non_event_body.push_str(line.trim());
                }
                StreamEvent::Done => {}
            }
        }

        // Some servers ignore `stream: true` and answer with a single
        // JSON body. Fall back to that body when no events arrived.
        if stats.pieces == 0 {
            if let Ok(parsed) = serde_json::from_str::<CompletionResponse>(&non_event_body) {
                if let Some(choice) = parsed.choices.first() {
                    if !choice.text.is_empty() {
                        stats.pieces = 1;
                        let _ = pieces.send(choice.text.clone()).await;
                    }
                }
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl TextGenerator for CompletionStreamGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
        pieces: mpsc::Sender<String>,
    ) -> Result<GenerationStats, BackendError> {
        debug!(
            prompt_chars = request.prompt.len(),
            max_new_tokens = request.max_new_tokens,
            "requesting streamed completion"
        );

        let wire = CompletionRequest {
            model: self.config.model.clone(),
            prompt: request.prompt.clone(),
            max_tokens: request.max_new_tokens,
            temperature: 0.0,
            stream: true,
            no_repeat_ngram_size: Some(request.no_repeat_ngram),
        };

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                debug!("retry attempt {} for completion request", attempt);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(&wire);
            if let Some(ref api_key) = self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error =
                            Some(BackendError::Api(format!("HTTP {}: {}", status, body)));
                        continue;
                    }
                    return self.drain_stream(response, &pieces).await;
                }
                Err(e) => {
                    last_error = Some(BackendError::Network(e.to_string()));
                }
            }
        }

        warn!(
            "completion request failed after {} attempts",
            self.config.max_retries
        );
        Err(last_error
            .unwrap_or_else(|| BackendError::Network("no request attempts were made".to_string())))
    }
}

/// Chat-completion client for the summarization model.
pub struct RemoteSummarizer {
    client: Client,
    config: RemoteEndpointConfig,
}

impl RemoteSummarizer {
    pub fn new(config: RemoteEndpointConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Initialization(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn build_instruction(&self, request: &SummaryRequest) -> String {
        format!(
            "Write a self-contained summary of the following study material in roughly {} to {} tokens. \
            Keep every fact that could answer an exam question. Respond with the summary only.\n\n{}",
            request.min_new_tokens, request.max_new_tokens, request.text
        )
    }
}

#[async_trait]
impl SliceSummarizer for RemoteSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String, BackendError> {
        debug!(
            text_chars = request.text.len(),
            max_new_tokens = request.max_new_tokens,
            "requesting slice summary"
        );

        let wire = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You condense study material into dense factual summaries.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.build_instruction(&request),
                },
            ],
            max_tokens: Some(request.max_new_tokens),
            temperature: Some(0.0),
        };

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                debug!("retry attempt {} for summary request", attempt);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(&wire);
            if let Some(ref api_key) = self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error =
                            Some(BackendError::Api(format!("HTTP {}: {}", status, body)));
                        continue;
                    }

                    match response.json::<ChatCompletionResponse>().await {
                        Ok(resp) => {
                            if let Some(choice) = resp.choices.first() {
                                return Ok(choice.message.content.trim().to_string());
                            }
                            last_error =
                                Some(BackendError::Api("no choices in response".to_string()));
                        }
                        Err(e) => {
                            last_error = Some(BackendError::Api(format!(
                                "failed to parse response: {}",
                                e
                            )));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(BackendError::Network(e.to_string()));
                }
            }
        }

        warn!(
            "summary request failed after {} attempts",
            self.config.max_retries
        );
        Err(last_error
            .unwrap_or_else(|| BackendError::Network("no request attempts were made".to_string())))
    }
}

enum StreamEvent {
    Piece(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> StreamEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return StreamEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return StreamEvent::Done;
    }
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => match chunk.choices.into_iter().next() {
            Some(choice) if !choice.text.is_empty() => StreamEvent::Piece(choice.text),
            _ => StreamEvent::Skip,
        },
        Err(e) => {
            debug!("skipping malformed stream event: {}", e);
            StreamEvent::Skip
        }
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_repeat_ngram_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
