//! Application state for the HTTP server

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::engine::CitationQueryEngine;
use crate::error::Result;
use crate::providers::{ollama_providers, EmbeddingProvider, LlmProvider};
use crate::retrieval::VectorIndex;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Document index, also the engine's retriever
    index: Arc<VectorIndex>,
    /// Query engine
    engine: Arc<CitationQueryEngine>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create state backed by Ollama and the on-disk index
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let (llm, embedder) = ollama_providers(&config.llm)?;
        tracing::info!(
            "Ollama providers initialized (embeddings: {}, generation: {})",
            config.llm.embed_model,
            config.llm.generate_model
        );

        if !llm.health_check().await.unwrap_or(false) {
            tracing::warn!("Ollama not reachable at {}", config.llm.base_url);
        }

        let index = VectorIndex::open_or_create(&config.index.storage_path, embedder, &config.retrieval)?;
        tracing::info!("Index ready with {} documents", index.list_documents().len());

        Self::from_parts(config, Arc::new(index), llm)
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        config: RagConfig,
        index: Arc<VectorIndex>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let engine = CitationQueryEngine::new(index.clone(), llm, &config)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                index,
                engine: Arc::new(engine),
                ready: RwLock::new(true),
            }),
        })
    }

    /// In-memory state for tests and embedding
    pub fn in_memory(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let index = VectorIndex::new(embedder, &config.retrieval)?;
        Self::from_parts(config, Arc::new(index), llm)
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.inner.index
    }

    pub fn engine(&self) -> &Arc<CitationQueryEngine> {
        &self.inner.engine
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
