//! Study content generation pipeline.
//!
//! Runs a whole session end to end: pull the session record, extract
//! text from every attached file, run the requested generation tasks
//! through the answer engine, render each result to PDF and record the
//! artifacts. File extraction failures skip the file; task failures
//! skip the task; the run fails only when no task produces anything.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::engine::AnswerEngine;
use crate::error::EngineError;
use crate::extract::TextExtractor;
use crate::metrics::METRICS;
use crate::progress::ProgressHandle;
use crate::render::PdfWriter;
use crate::store::{BlobStore, FileRef, GeneratedArtifact, SessionStore, StudySession};

/// A generation task label the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationTask {
    Answer,
    Summary,
}

impl GenerationTask {
    /// Parse a user-facing task label. Labels are matched loosely;
    /// the caller counts unknown labels as failed tasks.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "answer" | "qa" | "q&a" | "questions" => Some(Self::Answer),
            "summary" | "summarize" | "summarise" => Some(Self::Summary),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Summary => "summary",
        }
    }
}

/// Outcome of one session run.
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: String,
    pub artifacts: Vec<GeneratedArtifact>,
    pub tasks_failed: usize,
}

/// End-to-end study content generation.
pub struct GenerationService {
    sessions: Arc<dyn SessionStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    engine: Arc<AnswerEngine>,
    writer: PdfWriter,
    extraction_cache: moka::future::Cache<String, String>,
}

impl GenerationService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        engine: Arc<AnswerEngine>,
        writer: PdfWriter,
        extraction: &ExtractionConfig,
    ) -> Self {
        let extraction_cache = moka::future::Cache::builder()
            .max_capacity(extraction.cache_capacity)
            .time_to_live(Duration::from_secs(extraction.cache_ttl_secs))
            .build();

        Self {
            sessions,
            blobs,
            extractor,
            engine,
            writer,
            extraction_cache,
        }
    }

    /// Register a new session.
    pub async fn create_session(
        &self,
        name: String,
        description: String,
        instructions: String,
        generation_list: Vec<String>,
        config_map: IndexMap<String, serde_json::Value>,
    ) -> crate::Result<StudySession> {
        let mut session = StudySession::new(name, description, instructions);
        session.generation_list = generation_list;
        session.config_map = config_map;
        self.sessions.insert(session.clone()).await?;
        Ok(session)
    }

    /// Store uploaded file bytes and attach them to a session.
    pub async fn attach_file(
        &self,
        session_id: &str,
        file_name: String,
        content_type: String,
        bytes: Bytes,
    ) -> crate::Result<FileRef> {
        let blob_id = self.blobs.put(bytes).await?;
        let file = FileRef {
            file_name,
            content_type,
            blob_id,
        };
        self.sessions.add_file(session_id, file.clone()).await?;
        Ok(file)
    }

    pub async fn session(&self, id: &str) -> crate::Result<StudySession> {
        Ok(self.sessions.get(id).await?)
    }

    pub async fn artifact_bytes(&self, blob_id: &str) -> crate::Result<Bytes> {
        Ok(self.blobs.get(blob_id).await?)
    }

    /// Run every generation task of a session.
    pub async fn run_session(
        &self,
        session_id: &str,
        progress: &ProgressHandle,
    ) -> crate::Result<SessionReport> {
        let session = self.sessions.get(session_id).await?;

        progress.set_stage("extracting", "");
        let context = self.collect_context(&session).await;

        // An empty task list still answers the instructions, which is
        // the main use of a session.
        let tasks: Vec<String> = if session.generation_list.is_empty() {
            vec!["answer".to_string()]
        } else {
            session.generation_list.clone()
        };

        let mut artifacts: Vec<GeneratedArtifact> = Vec::new();
        let mut failed = 0usize;
        let mut attempted = 0usize;
        for label in &tasks {
            let Some(task) = GenerationTask::parse(label) else {
                warn!(task = %label, "unknown generation task");
                attempted += 1;
                failed += 1;
                continue;
            };
            attempted += 1;
            progress.set_stage("generating", task.label());
            match self.run_task(&session, task, &context, progress).await {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    failed += 1;
                    error!(
                        session_id = %session.id,
                        task = task.label(),
                        "generation task failed: {}",
                        e
                    );
                }
            }
        }

        if attempted > 0 && artifacts.is_empty() {
            METRICS.record_session(false);
            progress.fail("every generation task failed");
            return Err(EngineError::SessionFailed {
                session_id: session.id.clone(),
            });
        }

        METRICS.record_session(true);
        progress.finish();
        info!(
            session_id = %session.id,
            artifacts = artifacts.len(),
            failed,
            "session generation finished"
        );

        Ok(SessionReport {
            session_id: session.id,
            artifacts,
            tasks_failed: failed,
        })
    }

    /// Extract every attached file, skipping the ones that fail.
    async fn collect_context(&self, session: &StudySession) -> String {
        let mut parts: Vec<String> = Vec::new();
        for file in &session.files {
            match self.extract_file(file).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(file = %file.file_name, chars = text.len(), "extracted file");
                    parts.push(text);
                }
                Ok(_) => {
                    warn!(file = %file.file_name, "file produced no text");
                }
                Err(e) => {
                    warn!(file = %file.file_name, "skipping file: {}", e);
                }
            }
        }
        parts.join("\n")
    }

    /// Cached per blob id; repeated runs over the same upload skip the
    /// extraction work.
    async fn extract_file(&self, file: &FileRef) -> crate::Result<String> {
        let blobs = Arc::clone(&self.blobs);
        let extractor = Arc::clone(&self.extractor);
        let file = file.clone();
        self.extraction_cache
            .try_get_with(file.blob_id.clone(), async move {
                let bytes = blobs.get(&file.blob_id).await.map_err(EngineError::from)?;
                extractor
                    .extract(&bytes, &file.content_type)
                    .await
                    .map_err(EngineError::from)
            })
            .await
            .map_err(|e: Arc<EngineError>| EngineError::Internal(e.to_string()))
    }

    async fn run_task(
        &self,
        session: &StudySession,
        task: GenerationTask,
        context: &str,
        progress: &ProgressHandle,
    ) -> crate::Result<GeneratedArtifact> {
        let text = match task {
            GenerationTask::Answer => {
                self.engine
                    .answer(&session.instructions, context, progress)
                    .await?
                    .text
            }
            GenerationTask::Summary => self.engine.summarize_document(context, progress).await?,
        };

        progress.set_stage("rendering", task.label());
        let pdf = self.writer.write_pdf(&text)?;
        let blob_id = self.blobs.put(Bytes::from(pdf)).await?;

        let artifact = GeneratedArtifact {
            id: Uuid::new_v4().to_string(),
            task: task.label().to_string(),
            file_name: format!("{}-{}.pdf", slug(&session.name), task.label()),
            content_type: "application/pdf".to_string(),
            blob_id,
            created_at: Utc::now(),
        };
        self.sessions
            .record_artifact(&session.id, artifact.clone())
            .await?;
        METRICS.artifacts_published.inc();
        info!(
            session_id = %session.id,
            task = task.label(),
            file = %artifact.file_name,
            "published artifact"
        );
        Ok(artifact)
    }
}

/// File-name friendly version of a session name.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "session".to_string()
    } else {
        out
    }
}
