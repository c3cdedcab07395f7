//! Passage retrieval

mod index;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::RetrievedPassage;

pub use index::{cosine_similarity, VectorIndex};

/// Restricts a retrieval to part of the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFilter {
    /// Only passages of this document
    pub document_id: Option<String>,
}

impl RetrievalFilter {
    /// Filter on a single document
    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
        }
    }
}

/// Source of candidate passages for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Passages relevant to `query`, best first
    async fn retrieve(&self, query: &str, filter: &RetrievalFilter) -> Result<Vec<RetrievedPassage>>;

    /// Whether the backing index is loaded
    fn is_ready(&self) -> bool {
        true
    }
}
