//! Session and blob storage traits.

pub mod memory;
pub mod models;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use memory::{InMemoryBlobStore, InMemorySessionStore};
pub use models::{FileRef, GeneratedArtifact, StudySession};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("blob '{0}' not found")]
    BlobNotFound(String),
}

/// Persistence for study sessions and their generated artifacts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: StudySession) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<StudySession, StoreError>;

    async fn add_file(&self, session_id: &str, file: FileRef) -> Result<(), StoreError>;

    async fn record_artifact(
        &self,
        session_id: &str,
        artifact: GeneratedArtifact,
    ) -> Result<(), StoreError>;
}

/// Raw file bytes, addressed by id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return their id.
    async fn put(&self, bytes: Bytes) -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Bytes, StoreError>;
}
