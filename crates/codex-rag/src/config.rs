//! Configuration for the citation query engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "CODEX_CONFIG";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Citation chunking and validation
    pub citation: CitationConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Index storage
    pub index: IndexConfig,
    /// Voice pipeline adapter
    pub voice: VoiceConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `CODEX_CONFIG` if set, otherwise defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        check_chunking("citation", self.citation.chunk_size, self.citation.chunk_overlap)?;
        check_chunking("retrieval", self.retrieval.chunk_size, self.retrieval.chunk_overlap)?;

        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(Error::Config(
                "retrieval.similarity_threshold must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

fn check_chunking(section: &str, size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::Config(format!("{}.chunk_size must be positive", section)));
    }
    if overlap >= size {
        return Err(Error::Config(format!(
            "{}.chunk_overlap ({}) must be smaller than chunk_size ({})",
            section, overlap, size
        )));
    }
    Ok(())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// What to do with a citation that points outside the source set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationPolicy {
    /// Reject the whole citation list
    #[default]
    Strict,
    /// Drop the bad indices and keep the rest
    Lenient,
}

/// Citation chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationConfig {
    /// Size of a citable source chunk in characters
    pub chunk_size: usize,
    /// Overlap between neighbouring source chunks
    pub chunk_overlap: usize,
    /// Out-of-range citation handling
    pub policy: CitationPolicy,
    /// Text emitted where a citation list closes
    pub separator: String,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 20,
            policy: CitationPolicy::Strict,
            separator: "\n".to_string(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned per query
    pub top_k: usize,
    /// Minimum cosine similarity (0.0-1.0)
    pub similarity_threshold: f32,
    /// Passage size used when indexing documents
    pub chunk_size: usize,
    /// Passage overlap used when indexing documents
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            similarity_threshold: 0.2,
            chunk_size: 1024,
            chunk_overlap: 200,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Embedding dimensions
    pub embed_dimensions: usize,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Context window size (tokens)
    pub context_size: usize,
    /// Ask the model for a JSON object in buffered mode
    pub structured_output: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            embed_dimensions: 768,
            generate_model: "llama3.2:3b".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            context_size: 4096,
            structured_output: true,
        }
    }
}

/// Index storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Path of the JSON index snapshot
    pub storage_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codex-rag")
            .join("index.json");

        Self { storage_path }
    }
}

/// Voice pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Name the bot introduces itself with
    pub bot_name: String,
    /// Spoken when the pipeline starts
    pub greeting: String,
    /// Spoken in place of a closed citation list
    pub sentence_terminator: String,
    /// Strip inline `[n]` markers from spoken text
    pub filter_citations: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            bot_name: "Codex".to_string(),
            greeting: "Hello! I am Codex. What do you want to ask about the document?".to_string(),
            sentence_terminator: ".".to_string(),
            filter_citations: true,
        }
    }
}
