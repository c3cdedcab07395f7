//! In-memory embedding index with JSON snapshots

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RetrievalFilter, Retriever};
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::ingestion::SentenceSplitter;
use crate::providers::EmbeddingProvider;
use crate::types::{Document, Provenance, RetrievedPassage};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedPassage {
    id: Uuid,
    document_id: String,
    /// Position within the document, 0-based
    ordinal: usize,
    text: String,
    char_start: usize,
    char_end: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    documents: HashMap<String, Document>,
    passages: Vec<IndexedPassage>,
}

/// Embedding index over uploaded documents
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: SentenceSplitter,
    top_k: usize,
    similarity_threshold: f32,
    storage_path: Option<PathBuf>,
    inner: RwLock<Snapshot>,
    // held for a whole snapshot write so writers never share the temp file
    write_lock: Mutex<()>,
}

impl VectorIndex {
    /// Create an empty index that is never written to disk
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: &RetrievalConfig) -> Result<Self> {
        Self::with_snapshot(embedder, config, None, Snapshot::default())
    }

    /// Load a persisted index
    pub fn load(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::IndexUnavailable(format!(
                "Index not found at {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;

        tracing::info!(
            "Loaded index from {} ({} documents, {} passages)",
            path.display(),
            snapshot.documents.len(),
            snapshot.passages.len()
        );

        Self::with_snapshot(embedder, config, Some(path.to_path_buf()), snapshot)
    }

    /// Load the index at `path`, or start an empty one that persists there
    pub fn open_or_create(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path, embedder, config);
        }

        tracing::info!("Creating new index at {}", path.display());
        Self::with_snapshot(embedder, config, Some(path.to_path_buf()), Snapshot::default())
    }

    fn with_snapshot(
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
        storage_path: Option<PathBuf>,
        snapshot: Snapshot,
    ) -> Result<Self> {
        Ok(Self {
            embedder,
            splitter: SentenceSplitter::new(config.chunk_size, config.chunk_overlap)?,
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            storage_path,
            inner: RwLock::new(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    /// Where snapshots are written, if anywhere
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    /// Index a document. Content already indexed is returned as-is.
    ///
    /// The document is searchable once this returns, even if writing the
    /// snapshot failed; that failure is logged and the next write retries it.
    pub async fn add_document(&self, name: &str, text: &str) -> Result<Document> {
        let id = Document::content_id(text);
        if let Some(existing) = self.inner.read().documents.get(&id) {
            tracing::debug!("Document {} already indexed", id);
            return Ok(existing.clone());
        }

        let spans = self.splitter.split_spans(text);
        if spans.is_empty() {
            return Err(Error::invalid_request("Document text is empty"));
        }

        let texts: Vec<String> = spans.iter().map(|span| span.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != spans.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                spans.len(),
                embeddings.len()
            )));
        }

        let passages: Vec<IndexedPassage> = spans
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, (span, embedding))| IndexedPassage {
                id: Uuid::new_v4(),
                document_id: id.clone(),
                ordinal,
                text: span.text,
                char_start: span.char_start,
                char_end: span.char_end,
                embedding,
            })
            .collect();

        let document = Document {
            id: id.clone(),
            name: name.to_string(),
            passage_count: passages.len(),
            char_count: text.chars().count(),
            created_at: Utc::now(),
        };

        {
            let mut inner = self.inner.write();
            // a concurrent add of the same content may have won
            if let Some(existing) = inner.documents.get(&id) {
                return Ok(existing.clone());
            }
            inner.documents.insert(id.clone(), document.clone());
            inner.passages.extend(passages);
        }

        tracing::info!(
            "Indexed document '{}' ({}) with {} passages",
            name,
            id,
            document.passage_count
        );

        self.persist_logged().await;
        Ok(document)
    }

    /// All indexed documents, oldest first
    pub fn list_documents(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self.inner.read().documents.values().cloned().collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        documents
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        self.inner
            .read()
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// Remove a document and its passages
    pub async fn remove_document(&self, id: &str) -> Result<Document> {
        let removed = {
            let mut inner = self.inner.write();
            let document = inner
                .documents
                .remove(id)
                .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
            inner.passages.retain(|p| p.document_id != id);
            document
        };

        tracing::info!("Removed document {}", id);
        self.persist_logged().await;
        Ok(removed)
    }

    /// Number of indexed passages
    pub fn len(&self) -> usize {
        self.inner.read().passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current snapshot to `storage_path`, if set.
    ///
    /// Writers are serialized and each one captures the snapshot only after
    /// it holds the lock, so the file on disk never goes back in time.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = self.storage_path.clone() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string(&*self.inner.read())?;

        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!("Failed to write index snapshot: {}", e);
        }
    }

    /// Rank passages of `document_id` (or all documents) against an embedding
    pub fn search(&self, embedding: &[f32], document_id: Option<&str>) -> Vec<RetrievedPassage> {
        let inner = self.inner.read();

        let mut scored: Vec<(f32, &IndexedPassage)> = inner
            .passages
            .iter()
            .filter(|p| document_id.map_or(true, |id| p.document_id == id))
            .map(|p| (cosine_similarity(embedding, &p.embedding), p))
            .filter(|(score, _)| *score >= self.similarity_threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        scored
            .into_iter()
            .map(|(score, passage)| {
                let location = inner
                    .documents
                    .get(&passage.document_id)
                    .map(|doc| format!("{}, passage {}", doc.name, passage.ordinal + 1));

                RetrievedPassage {
                    text: passage.text.clone(),
                    score,
                    provenance: Provenance {
                        document_id: passage.document_id.clone(),
                        passage_id: passage.id,
                        location,
                        char_start: passage.char_start,
                        char_end: passage.char_end,
                    },
                }
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for VectorIndex {
    async fn retrieve(&self, query: &str, filter: &RetrievalFilter) -> Result<Vec<RetrievedPassage>> {
        if let Some(id) = &filter.document_id {
            if !self.inner.read().documents.contains_key(id) {
                return Err(Error::DocumentNotFound(id.clone()));
            }
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::retrieval(format!("Query embedding failed: {}", e)))?;

        let passages = self.search(&embedding, filter.document_id.as_deref());
        tracing::debug!("Retrieved {} passages", passages.len());
        Ok(passages)
    }
}

fn write_atomically(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;

    tracing::debug!("Persisted index to {}", path.display());
    Ok(())
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
