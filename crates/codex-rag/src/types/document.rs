//! Documents, retrieved passages and numbered source chunks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// An indexed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// SHA-256 hex of the content
    pub id: String,
    /// Display name
    pub name: String,
    /// Number of indexed passages
    pub passage_count: usize,
    /// Content length in characters
    pub char_count: usize,
    /// When the document was indexed
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Derive the document id for a piece of content
    pub fn content_id(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }
}

/// Where a passage came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Owning document
    pub document_id: String,
    /// Passage id inside the index
    pub passage_id: Uuid,
    /// Human-readable location (e.g. "report.md, passage 3")
    pub location: Option<String>,
    /// Character range in the document
    pub char_start: usize,
    pub char_end: usize,
}

/// A passage returned by a retriever
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Passage text
    pub text: String,
    /// Relevance score (higher is better)
    pub score: f32,
    /// Provenance
    pub provenance: Provenance,
}

impl RetrievedPassage {
    /// Create a passage with minimal provenance
    pub fn new(document_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        let text = text.into();
        let char_end = text.chars().count();
        Self {
            text,
            score,
            provenance: Provenance {
                document_id: document_id.into(),
                passage_id: Uuid::new_v4(),
                location: None,
                char_start: 0,
                char_end,
            },
        }
    }
}

/// A numbered, citable unit shown to the model as `Source {index}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChunk {
    /// 1-based position in this query's source list
    pub index: usize,
    /// Chunk text
    pub text: String,
    /// Score of the originating passage
    pub score: f32,
    /// Originating passage
    pub provenance: Provenance,
}
