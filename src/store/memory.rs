//! In-memory store implementations.
//!
//! Process-local stores backed by concurrent maps. Blobs are content
//! addressed: the id is the hex SHA-256 of the bytes, so re-uploading
//! identical content lands on the same id.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::store::models::{FileRef, GeneratedArtifact, StudySession};
use crate::store::{BlobStore, SessionStore, StoreError};

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, StudySession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: StudySession) -> Result<(), StoreError> {
        debug!(session_id = %session.id, "storing session");
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<StudySession, StoreError> {
        self.sessions
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    async fn add_file(&self, session_id: &str, file: FileRef) -> Result<(), StoreError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        session.files.push(file);
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn record_artifact(
        &self,
        session_id: &str,
        artifact: GeneratedArtifact,
    ) -> Result<(), StoreError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        session.artifacts.push(artifact);
        session.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Bytes>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<String, StoreError> {
        let digest = Sha256::digest(&bytes);
        let id = hex::encode(digest);
        self.blobs.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Bytes, StoreError> {
        self.blobs
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::BlobNotFound(id.to_string()))
    }
}
