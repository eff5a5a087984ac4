//! Study session data model.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One uploaded source file attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub file_name: String,
    pub content_type: String,
    /// Blob store id of the raw bytes.
    pub blob_id: String,
}

/// A generated output file recorded against a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub id: String,
    /// Task that produced it, e.g. "answer" or "summary".
    pub task: String,
    pub file_name: String,
    pub content_type: String,
    pub blob_id: String,
    pub created_at: DateTime<Utc>,
}

/// A study session: uploaded material, the user's instructions and the
/// list of generation tasks to run over them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Free-form prompt; doubles as the query for answer tasks.
    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub files: Vec<FileRef>,

    /// Task labels to run, in order.
    #[serde(default)]
    pub generation_list: Vec<String>,

    /// Opaque per-session settings, preserved as given.
    #[serde(default)]
    pub config_map: IndexMap<String, serde_json::Value>,

    #[serde(default)]
    pub artifacts: Vec<GeneratedArtifact>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudySession {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            files: Vec::new(),
            generation_list: Vec::new(),
            config_map: IndexMap::new(),
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trips_through_json() {
        let mut session = StudySession::new("Biology", "Midterm prep", "Summarize chapter 3");
        session.files.push(FileRef {
            file_name: "chapter3.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            blob_id: "abc123".to_string(),
        });
        session.generation_list.push("summary".to_string());

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"fileName\":\"chapter3.pdf\""));
        assert!(json.contains("\"generationList\""));

        let back: StudySession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.files.len(), 1);
    }

    #[test]
    fn optional_fields_default() {
        let json = r#"{
            "id": "s1",
            "name": "History",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }"#;
        let session: StudySession = serde_json::from_str(json).unwrap();
        assert!(session.files.is_empty());
        assert!(session.instructions.is_empty());
        assert!(session.generation_list.is_empty());
    }
}
