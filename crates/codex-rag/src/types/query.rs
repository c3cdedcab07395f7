//! Request types

use serde::{Deserialize, Serialize};

/// Query request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub question: String,
    /// Document to answer from
    pub document_id: String,
}

impl QueryRequest {
    /// Create a new query
    pub fn new(question: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            document_id: document_id.into(),
        }
    }
}

/// Plain-text document submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Display name
    pub name: String,
    /// Document text
    pub text: String,
}
