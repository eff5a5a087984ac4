//! Model handle construction from configuration.
//!
//! When a remote endpoint is configured the handle talks to it;
//! otherwise it falls back to the offline extractive backend so the
//! service stays usable without any model server.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{GeneratorConfig, SummarizerModelConfig};
use crate::llm::extractive::{ExtractiveGenerator, ExtractiveSummarizer};
use crate::llm::model::{ModelHandle, ModelLimits, SliceSummarizer, SummarizerHandle, TextGenerator};
use crate::llm::remote::{CompletionStreamGenerator, RemoteEndpointConfig, RemoteSummarizer};
use crate::llm::tokenizer::{TextTokenizer, TiktokenTokenizer};

pub fn build_generator(config: &GeneratorConfig) -> crate::Result<Arc<ModelHandle>> {
    let tokenizer: Arc<dyn TextTokenizer> =
        Arc::new(TiktokenTokenizer::from_encoding(&config.encoding)?);

    let backend: Arc<dyn TextGenerator> = match &config.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, model = %config.model, "using remote answer model");
            Arc::new(CompletionStreamGenerator::new(RemoteEndpointConfig {
                endpoint: endpoint.clone(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
                max_retries: config.max_retries,
            })?)
        }
        None => {
            warn!("no generator endpoint configured, falling back to extractive answers");
            Arc::new(ExtractiveGenerator)
        }
    };

    Ok(Arc::new(ModelHandle::new(
        config.model.clone(),
        tokenizer,
        backend,
        ModelLimits {
            context_window: config.context_window,
        },
    )))
}

pub fn build_summarizer(config: &SummarizerModelConfig) -> crate::Result<Arc<SummarizerHandle>> {
    let tokenizer: Arc<dyn TextTokenizer> =
        Arc::new(TiktokenTokenizer::from_encoding(&config.encoding)?);

    let backend: Arc<dyn SliceSummarizer> = match &config.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, model = %config.model, "using remote summarization model");
            Arc::new(RemoteSummarizer::new(RemoteEndpointConfig {
                endpoint: endpoint.clone(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
                max_retries: config.max_retries,
            })?)
        }
        None => {
            warn!("no summarizer endpoint configured, falling back to extractive summaries");
            Arc::new(ExtractiveSummarizer)
        }
    };

    Ok(Arc::new(SummarizerHandle::new(
        config.model.clone(),
        tokenizer,
        backend,
        ModelLimits {
            context_window: config.context_window,
        },
    )))
}
