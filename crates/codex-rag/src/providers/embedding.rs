//! Vectors for passages and queries

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Turns text into fixed-length vectors for the passage index.
///
/// Passages and the queries run against them have to come from the same
/// provider; vectors from different models are not comparable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per passage, in input order.
    ///
    /// A vector whose length differs from `dimensions()` is an error, so a
    /// misconfigured model is caught at indexing time rather than scoring 0.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let expected = self.dimensions();
        let mut vectors = Vec::with_capacity(texts.len());

        for text in texts {
            let vector = self.embed(text).await?;
            if vector.len() != expected {
                return Err(Error::embedding(format!(
                    "{} returned {} dimensions, expected {}",
                    self.name(),
                    vector.len(),
                    expected
                )));
            }
            vectors.push(vector);
        }

        Ok(vectors)
    }

    /// Vector length, `embed_dimensions` in the LLM config for Ollama
    fn dimensions(&self) -> usize;

    async fn health_check(&self) -> Result<bool>;

    /// Name used in logs
    fn name(&self) -> &str;
}
