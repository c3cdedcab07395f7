//! codex-rag: document Q&A with citation-aware answers
//!
//! Retrieved passages are split into numbered sources, the model is prompted
//! to cite them by number, and its buffered or streamed output is parsed back
//! into prose plus a validated citation list. An HTTP server and a voice
//! pipeline adapter sit on top of the engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod types;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CitationPolicy, RagConfig};
pub use engine::{CitationQueryEngine, QueryOutcome, StreamingAnswer};
pub use error::{CitationError, Error, MalformedCitation, Result};
pub use generation::SynthesisMode;
pub use types::{
    CitationSummary, CitedAnswer, CitedResponse, Document, ResolvedCitation, SourceChunk,
    StreamEvent,
};
