use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use study_engine::api::{build_router, AppState};
use study_engine::engine::AnswerEngine;
use study_engine::extract::{MimeDispatchExtractor, TextExtractor};
use study_engine::llm::runtime::{build_generator, build_summarizer};
use study_engine::progress::ProgressTracker;
use study_engine::render::PdfWriter;
use study_engine::service::GenerationService;
use study_engine::store::{
    BlobStore, InMemoryBlobStore, InMemorySessionStore, SessionStore,
};
use study_engine::Config;

fn init_tracing(config: &study_engine::config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!(
        context_window = config.generator.context_window,
        generation_reserve = config.generator.generation_reserve,
        encoding = %config.generator.encoding,
        "starting study engine"
    );

    let generator = build_generator(&config.generator)
        .context("failed to initialize generator backend")?;
    let summarizer = build_summarizer(&config.summarizer)
        .context("failed to initialize summarizer backend")?;
    let engine = Arc::new(AnswerEngine::new(generator, summarizer, &config));

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
    let extractor: Arc<dyn TextExtractor> = Arc::new(
        MimeDispatchExtractor::from_config(&config.extraction)
            .context("failed to initialize file extraction")?,
    );
    let service = Arc::new(GenerationService::new(
        sessions,
        blobs,
        extractor,
        Arc::clone(&engine),
        PdfWriter::default(),
        &config.extraction,
    ));

    let state = AppState {
        engine,
        service,
        progress: Arc::new(ProgressTracker::new()),
        api_key: config.auth.api_key.clone(),
    };
    let router = build_router(state, config.server.max_body_bytes);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("listening on {address}");

    axum::serve(listener, router)
        .await
        .context("server terminated")?;

    Ok(())
}
