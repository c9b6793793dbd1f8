//! Core data models shared by the ingestion, retrieval, and chat pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous span of a document's extracted text.
///
/// `start..end` is the byte range of the untrimmed window in the source
/// text; `text` is that window with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, lowercase hex.
    pub hash: String,
    pub start: usize,
    pub end: usize,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks returned by a similarity query, most relevant first.
pub type RetrievedContext = Vec<ScoredChunk>;

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the session transcript. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    message: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(message: impl Into<String>, role: Role) -> Self {
        Self {
            message: message.into(),
            role,
            created_at: Utc::now(),
        }
    }

    pub fn human(message: impl Into<String>) -> Self {
        Self::new(message, Role::Human)
    }

    pub fn ai(message: impl Into<String>) -> Self {
        Self::new(message, Role::Ai)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatTurn::ai("hi")).unwrap();
        assert!(json.contains("\"role\":\"ai\""));
        assert_eq!(Role::Human.to_string(), "human");
    }
}
