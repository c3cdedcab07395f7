//! Binding cited source numbers to their chunks

use crate::config::CitationPolicy;
use crate::error::CitationError;
use crate::types::{ResolvedCitation, SourceChunk};

/// Citations that survived validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// One entry per accepted citation, in citation order
    pub resolved: Vec<ResolvedCitation>,
    /// Indices dropped under `CitationPolicy::Lenient`
    pub rejected: Vec<usize>,
}

impl Resolution {
    /// Indices that were accepted
    pub fn indices(&self) -> Vec<usize> {
        self.resolved.iter().map(|c| c.index).collect()
    }
}

/// Map 1-based citation numbers to the chunks shown to the model.
///
/// Indices are never clamped: with `Strict` the first index outside
/// `1..=chunks.len()` fails the whole list, with `Lenient` it is dropped.
pub fn resolve(
    citations: &[usize],
    chunks: &[SourceChunk],
    policy: CitationPolicy,
) -> Result<Resolution, CitationError> {
    let mut resolution = Resolution::default();

    for &index in citations {
        match index.checked_sub(1).and_then(|i| chunks.get(i)) {
            Some(chunk) => resolution.resolved.push(ResolvedCitation::from_chunk(chunk)),
            None => {
                let err = CitationError::OutOfRange {
                    index,
                    chunk_count: chunks.len(),
                };
                match policy {
                    CitationPolicy::Strict => return Err(err),
                    CitationPolicy::Lenient => {
                        tracing::warn!("Dropping citation: {}", err);
                        resolution.rejected.push(index);
                    }
                }
            }
        }
    }

    Ok(resolution)
}
