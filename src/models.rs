//! Core data models used throughout Study Harness.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an ingested document.
///
/// Created as `Processing` on upload, moved to `Completed` or `Failed` by
/// the ingestion pipeline. Only chunks of `Completed` documents are eligible
/// for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// One ingested source file, stored in SQLite. Owns zero or more chunks.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub subject: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A contiguous excerpt of a document's extracted text, paired with its
/// embedding vector. Immutable once created; deleted in bulk when the
/// owning document is deleted.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// Encoded with the "passage" convention, produced from exactly `content`.
    pub embedding: Vec<f32>,
    /// Free-form metadata (e.g. page number), serialized JSON.
    pub metadata_json: String,
    pub hash: String,
}

/// A chunk joined with its owning document's metadata and a similarity
/// score, produced only as a vector-search result. Not persisted.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub subject: Option<String>,
    pub content: String,
    /// Cosine similarity in `[-1, 1]`; practically `[0, 1]` for normalized
    /// non-degenerate text.
    pub similarity: f32,
}

/// Response-facing source attribution: lets a caller trace an answer back
/// to the chunks it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedDocument {
    pub document_id: String,
    pub filename: String,
    pub subject: Option<String>,
    /// First 200 characters of the chunk content with a trailing marker.
    /// The marker is appended unconditionally — its presence does not imply
    /// the original was longer.
    pub chunk_content: String,
}

/// Append-only audit record of one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub question: String,
    pub answer: String,
    pub used_rag: bool,
    pub used_web_search: bool,
    pub referenced_chunk_ids: Vec<String>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in ["processing", "completed", "failed"] {
            assert_eq!(DocumentStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(DocumentStatus::parse("pending").is_none());
    }
}
