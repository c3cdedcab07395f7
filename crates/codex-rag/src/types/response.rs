//! Answer types produced by the query engine

use serde::{Deserialize, Serialize};

use super::document::SourceChunk;
use crate::error::CitationError;

/// A model answer with the source numbers it cited
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitedAnswer {
    /// Answer prose
    pub answer: String,
    /// Cited source numbers, in order of mention
    #[serde(default)]
    pub citations: Vec<usize>,
}

impl CitedAnswer {
    /// Create a new answer
    pub fn new(answer: impl Into<String>, citations: Vec<usize>) -> Self {
        Self {
            answer: answer.into(),
            citations,
        }
    }
}

/// A citation bound to the chunk it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCitation {
    /// Source number as cited
    pub index: usize,
    /// Exact chunk text
    pub text: String,
    /// Owning document
    pub document_id: String,
    /// Human-readable location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Retrieval score of the originating passage
    pub score: f32,
}

impl ResolvedCitation {
    /// Bind a citation to its chunk
    pub fn from_chunk(chunk: &SourceChunk) -> Self {
        Self {
            index: chunk.index,
            text: chunk.text.clone(),
            document_id: chunk.provenance.document_id.clone(),
            location: chunk.provenance.location.clone(),
            score: chunk.score,
        }
    }
}

/// Final citation state of one answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationSummary {
    /// Cited source numbers as parsed
    pub citations: Vec<usize>,
    /// Citations bound to their chunks
    pub sources: Vec<ResolvedCitation>,
    /// Indices dropped under the lenient policy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<usize>,
    /// Why the citation list cannot be trusted, if it can't
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_error: Option<CitationError>,
}

/// Answer given when retrieval finds nothing to cite
pub const NOT_FOUND_ANSWER: &str =
    "I couldn't find relevant information in the document to answer this question.";

/// Buffered query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitedResponse {
    /// Answer prose
    pub answer: String,
    /// Citation state
    #[serde(flatten)]
    pub summary: CitationSummary,
    /// Number of source chunks shown to the model
    pub chunks_retrieved: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl CitedResponse {
    /// Answer used when retrieval finds nothing
    pub fn not_found(processing_time_ms: u64) -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            summary: CitationSummary::default(),
            chunks_retrieved: 0,
            processing_time_ms,
        }
    }
}

/// One item of a streamed answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Prose to forward to the sink
    Text(String),
    /// A citation list closed here
    Separator,
    /// Stream finished; always the last event
    Completed(CitationSummary),
}
