//! Test doubles for the provider and retriever seams

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider, TokenStream};
use crate::retrieval::{RetrievalFilter, Retriever};
use crate::types::RetrievedPassage;

/// LLM that replays a fixed answer
#[derive(Default)]
pub struct ScriptedLlm {
    reply: String,
    json_reply: Option<String>,
    tokens: Option<Vec<String>>,
    fail_after: Option<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Default::default()
        }
    }

    /// Reply to `complete_json` with this text instead
    pub fn with_json(mut self, json: impl Into<String>) -> Self {
        self.json_reply = Some(json.into());
        self
    }

    /// Stream exactly these tokens
    pub fn with_tokens(mut self, tokens: &[&str]) -> Self {
        self.tokens = Some(tokens.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Fail the stream after `n` tokens
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn stream_tokens(&self) -> Vec<String> {
        if let Some(tokens) = &self.tokens {
            return tokens.clone();
        }
        self.reply
            .split(' ')
            .enumerate()
            .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {}", word) })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    async fn complete_json(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.json_reply.clone().unwrap_or_else(|| self.reply.clone()))
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        self.prompts.lock().push(prompt.to_string());

        let mut items: Vec<Result<String>> = self.stream_tokens().into_iter().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(Error::model("stream interrupted")));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

/// Retriever returning a fixed passage list
#[derive(Default)]
pub struct StaticRetriever {
    passages: Vec<RetrievedPassage>,
    unavailable: bool,
    failing: bool,
}

impl StaticRetriever {
    /// One passage per text, all owned by `document_id`
    pub fn new(document_id: &str, texts: &[&str]) -> Self {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(i, text)| RetrievedPassage::new(document_id, *text, 1.0 - i as f32 * 0.1))
            .collect();
        Self {
            passages,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str, filter: &RetrievalFilter) -> Result<Vec<RetrievedPassage>> {
        if self.failing {
            return Err(Error::retrieval("backend down"));
        }
        Ok(self
            .passages
            .iter()
            .filter(|p| {
                filter
                    .document_id
                    .as_ref()
                    .map_or(true, |id| &p.provenance.document_id == id)
            })
            .cloned()
            .collect())
    }

    fn is_ready(&self) -> bool {
        !self.unavailable
    }
}

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.unicode_words() {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u16::from_be_bytes([digest[0], digest[1]]) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}
