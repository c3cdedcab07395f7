//! Turning retrieved passages into numbered, citable sources

use crate::ingestion::SentenceSplitter;
use crate::types::{RetrievedPassage, SourceChunk};

/// Split every passage and number the pieces `1..=N` in retrieval order.
///
/// Numbering is positional: reordering the passages renumbers everything,
/// so it has to be redone for every query.
pub fn renumber(passages: &[RetrievedPassage], splitter: &SentenceSplitter) -> Vec<SourceChunk> {
    let mut chunks: Vec<SourceChunk> = Vec::new();

    for passage in passages {
        for text in splitter.split(&passage.text) {
            chunks.push(SourceChunk {
                index: chunks.len() + 1,
                text,
                score: passage.score,
                provenance: passage.provenance.clone(),
            });
        }
    }

    tracing::debug!(
        "Renumbered {} passages into {} source chunks",
        passages.len(),
        chunks.len()
    );

    chunks
}
