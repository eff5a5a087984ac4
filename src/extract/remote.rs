//! Remote recognition clients for media files.
//!
//! OCR and speech transcription run in separate services; this client
//! posts the raw file bytes and reads back `{"text": ...}`. The same
//! shape serves both, parameterized by kind for logs and metrics.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::extract::ExtractionError;

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    text: String,
}

/// Client for one recognition endpoint.
pub struct RemoteRecognizer {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: usize,
    kind: &'static str,
}

impl RemoteRecognizer {
    pub fn new(
        kind: &'static str,
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            max_retries,
            kind,
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Send file bytes for recognition and return the recognized text.
    pub async fn recognize(
        &self,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, ExtractionError> {
        debug!(
            kind = self.kind,
            bytes = bytes.len(),
            content_type,
            "sending recognition request"
        );

        let mut last_error = None;
        for attempt in 0..self.max_retries.max(1) {
            if attempt > 0 {
                debug!("retry attempt {} for {} request", attempt, self.kind);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self
                .http
                .post(&self.endpoint)
                .header(CONTENT_TYPE, content_type)
                .body(bytes.to_vec());
            if let Some(ref api_key) = self.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error = Some(ExtractionError::Upstream(format!(
                            "HTTP {}: {}",
                            status, body
                        )));
                        continue;
                    }
                    match response.json::<RecognizeResponse>().await {
                        Ok(parsed) => return Ok(parsed.text),
                        Err(e) => {
                            last_error = Some(ExtractionError::InvalidResponse(e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(ExtractionError::RequestFailed(e.to_string()));
                }
            }
        }

        warn!(
            "{} request failed after {} attempts",
            self.kind,
            self.max_retries.max(1)
        );
        Err(last_error.unwrap_or_else(|| {
            ExtractionError::RequestFailed("no request attempts were made".to_string())
        }))
    }
}
