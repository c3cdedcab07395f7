//! Provider abstractions for embeddings and LLM
//!
//! Trait-based so the engine can run against Ollama or a test double.

pub mod embedding;
pub mod llm;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use llm::{LlmProvider, TokenStream};
pub use ollama::{ollama_providers, OllamaEmbedder, OllamaLlm};
