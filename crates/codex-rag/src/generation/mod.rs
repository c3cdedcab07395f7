//! Answer generation with citation-aware prompting and parsing

pub mod citation;
pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod sources;
pub mod synthesizer;

pub use citation::{resolve, Resolution};
pub use ollama::OllamaClient;
pub use parser::{parse_complete, parse_stream, CitationParser, ParseOutcome, ParsedItem, ParserEvent, ParserState};
pub use prompt::CitationPrompt;
pub use sources::renumber;
pub use synthesizer::{RawAnswer, ResponseSynthesizer, SynthesisMode, SynthesizerConfig};
