//! Core types for the citation query engine

pub mod document;
pub mod query;
pub mod response;

pub use document::{Document, Provenance, RetrievedPassage, SourceChunk};
pub use query::{IngestRequest, QueryRequest};
pub use response::{
    CitationSummary, CitedAnswer, CitedResponse, ResolvedCitation, StreamEvent,
    NOT_FOUND_ANSWER,
};
