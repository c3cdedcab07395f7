//! LLM provider trait for generating answers

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Ordered, finite stream of text fragments from a model.
///
/// Not restartable. Dropping it cancels the underlying request.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Trait for LLM-based answer generation
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (llama3.2, phi3, etc.)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt and return the whole text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete a prompt, asking the model for a JSON object.
    ///
    /// The output is not guaranteed to be valid JSON; callers decode it.
    async fn complete_json(&self, prompt: &str) -> Result<String> {
        self.complete(prompt).await
    }

    /// Start a streamed completion
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
