//! File content extraction.
//!
//! Turns uploaded study material into plain text. PDFs are parsed
//! locally; images and audio go to remote recognition services when
//! those are configured. Dispatch is by declared content type.

pub mod pdf;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ExtractionConfig;
use crate::metrics::METRICS;

pub use pdf::PdfTextExtractor;
pub use remote::RemoteRecognizer;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("no extractor configured for {family} files")]
    Unavailable { family: &'static str },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("recognition request failed: {0}")]
    RequestFailed(String),

    #[error("recognition upstream error: {0}")]
    Upstream(String),

    #[error("invalid recognition response: {0}")]
    InvalidResponse(String),
}

/// Extracts plain text from file bytes.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError>;
}

/// Routes files to the right extractor by media type.
pub struct MimeDispatchExtractor {
    pdf: PdfTextExtractor,
    ocr: Option<Arc<RemoteRecognizer>>,
    transcriber: Option<Arc<RemoteRecognizer>>,
}

impl MimeDispatchExtractor {
    pub fn new(
        ocr: Option<Arc<RemoteRecognizer>>,
        transcriber: Option<Arc<RemoteRecognizer>>,
    ) -> Self {
        Self {
            pdf: PdfTextExtractor,
            ocr,
            transcriber,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let ocr = match &config.ocr_endpoint {
            Some(endpoint) => Some(Arc::new(RemoteRecognizer::new(
                "ocr",
                endpoint.clone(),
                config.api_key.clone(),
                timeout,
                config.max_retries,
            )?)),
            None => None,
        };

        let transcriber = match &config.transcriber_endpoint {
            Some(endpoint) => Some(Arc::new(RemoteRecognizer::new(
                "transcription",
                endpoint.clone(),
                config.api_key.clone(),
                timeout,
                config.max_retries,
            )?)),
            None => None,
        };

        Ok(Self::new(ocr, transcriber))
    }

    async fn dispatch(
        &self,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<String, ExtractionError> {
        if media_type == "application/pdf" {
            return self.pdf.extract_bytes(bytes);
        }
        if media_type.starts_with("text/") {
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
        if media_type.starts_with("image/") {
            let ocr = self
                .ocr
                .as_ref()
                .ok_or(ExtractionError::Unavailable { family: "image" })?;
            return ocr.recognize(bytes, media_type).await;
        }
        if media_type.starts_with("audio/") {
            let transcriber = self
                .transcriber
                .as_ref()
                .ok_or(ExtractionError::Unavailable { family: "audio" })?;
            return transcriber.recognize(bytes, media_type).await;
        }
        Err(ExtractionError::UnsupportedContentType(
            media_type.to_string(),
        ))
    }
}

fn metric_kind(media_type: &str) -> &'static str {
    if media_type == "application/pdf" {
        "pdf"
    } else if media_type.starts_with("text/") {
        "text"
    } else if media_type.starts_with("image/") {
        "image"
    } else if media_type.starts_with("audio/") {
        "audio"
    } else {
        "unsupported"
    }
}

#[async_trait]
impl TextExtractor for MimeDispatchExtractor {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError> {
        // Strip parameters such as "; charset=utf-8".
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();

        let result = self.dispatch(bytes, &media_type).await;
        METRICS.record_extraction(metric_kind(&media_type), result.is_ok());
        result
    }
}
