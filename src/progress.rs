//! Per-session progress for long-running generation.
//!
//! Generation runs in a spawned task; clients poll the progress
//! endpoint while it works. Writers go through a [`ProgressHandle`] so
//! pipeline code never has to care whether anyone is watching.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Snapshot of one session's generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProgress {
    /// Coarse stage: "queued", "extracting", "generating", "rendering",
    /// "done" or "failed".
    pub stage: String,
    /// Human-readable detail, e.g. the task currently running.
    pub detail: String,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    /// Streamed output pieces observed so far.
    pub generated_pieces: usize,
    pub done: bool,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for GenerationProgress {
    fn default() -> Self {
        Self {
            stage: "queued".to_string(),
            detail: String::new(),
            total_chunks: 0,
            completed_chunks: 0,
            generated_pieces: 0,
            done: false,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Session-id keyed progress table.
#[derive(Default)]
pub struct ProgressTracker {
    sessions: DashMap<String, GenerationProgress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<GenerationProgress> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Register a session and return a writer handle for it.
    pub fn start(self: &Arc<Self>, session_id: impl Into<String>) -> ProgressHandle {
        let session_id = session_id.into();
        self.sessions
            .insert(session_id.clone(), GenerationProgress::default());
        ProgressHandle {
            tracker: Some(Arc::clone(self)),
            session_id,
        }
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

/// Write side of the progress table. A disabled handle ignores all
/// updates, for callers that do not track progress.
#[derive(Clone)]
pub struct ProgressHandle {
    tracker: Option<Arc<ProgressTracker>>,
    session_id: String,
}

impl ProgressHandle {
    pub fn disabled() -> Self {
        Self {
            tracker: None,
            session_id: String::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn update(&self, apply: impl FnOnce(&mut GenerationProgress)) {
        if let Some(tracker) = &self.tracker {
            let mut entry = tracker
                .sessions
                .entry(self.session_id.clone())
                .or_default();
            apply(&mut entry);
            entry.updated_at = Utc::now();
        }
    }

    pub fn set_stage(&self, stage: &str, detail: &str) {
        self.update(|p| {
            p.stage = stage.to_string();
            p.detail = detail.to_string();
        });
    }

    /// Announce a chunked run. Resets per-run chunk counters.
    pub fn set_total_chunks(&self, total: usize) {
        self.update(|p| {
            p.total_chunks = total;
            p.completed_chunks = 0;
        });
    }

    pub fn chunk_done(&self) {
        self.update(|p| p.completed_chunks += 1);
    }

    pub fn record_pieces(&self, count: usize) {
        if count > 0 {
            self.update(|p| p.generated_pieces += count);
        }
    }

    pub fn finish(&self) {
        self.update(|p| {
            p.stage = "done".to_string();
            p.detail.clear();
            p.done = true;
        });
    }

    pub fn fail(&self, message: &str) {
        self.update(|p| {
            p.stage = "failed".to_string();
            p.done = true;
            p.error = Some(message.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_stages_and_chunks() {
        let tracker = Arc::new(ProgressTracker::new());
        let handle = tracker.start("session-1");

        handle.set_stage("generating", "answer");
        handle.set_total_chunks(3);
        handle.chunk_done();
        handle.record_pieces(5);

        let progress = tracker.get("session-1").unwrap();
        assert_eq!(progress.stage, "generating");
        assert_eq!(progress.total_chunks, 3);
        assert_eq!(progress.completed_chunks, 1);
        assert_eq!(progress.generated_pieces, 5);
        assert!(!progress.done);
    }

    #[test]
    fn finish_and_fail_are_terminal() {
        let tracker = Arc::new(ProgressTracker::new());
        let done = tracker.start("done-session");
        done.finish();
        assert!(tracker.get("done-session").unwrap().done);

        let failed = tracker.start("failed-session");
        failed.fail("backend unreachable");
        let progress = tracker.get("failed-session").unwrap();
        assert!(progress.done);
        assert_eq!(progress.error.as_deref(), Some("backend unreachable"));
    }

    #[test]
    fn unknown_session_is_absent() {
        let tracker = ProgressTracker::new();
        assert!(tracker.get("nope").is_none());
    }

    #[test]
    fn disabled_handle_ignores_updates() {
        let handle = ProgressHandle::disabled();
        handle.set_stage("generating", "answer");
        handle.finish();
    }
}
