//! Knowledge system type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Name of the knowledge base
    pub name: String,

    /// Embedding provider: "trigram" or "ollama"
    pub provider: String,

    /// Embedding model identifier
    pub model: String,

    /// Embedding vector dimension
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: u32,

    /// Number of documents returned when the caller does not ask for a count
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Upper bound on a single embedding call
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,

    /// Optional relevance floor; results scoring below it are dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// Seed corpus file; the built-in corpus is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_path: Option<PathBuf>,

    /// Ollama base URL (falls back to OLLAMA_URL, then localhost)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_url: Option<String>,
}

fn default_embedding_dim() -> u32 {
    384
}

fn default_top_k() -> u32 {
    2
}

fn default_embed_timeout_secs() -> u64 {
    10
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            embedding_dim: default_embedding_dim(),
            top_k: default_top_k(),
            embed_timeout_secs: default_embed_timeout_secs(),
            min_score: None,
            seed_path: None,
            ollama_url: None,
        }
    }
}

/// A document waiting to be embedded and stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewDocument {
    /// Policy text
    pub content: String,

    /// Category the document is filed under, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Question this document answers, if it came from a Q&A corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl NewDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn answering(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }
}

/// A persisted document: policy text plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Store-assigned id, monotonic in insertion order
    pub id: i64,

    /// Immutable document text
    pub content: String,

    /// Category, if the document was filed under one
    pub category: Option<String>,

    /// Source question, if any
    pub question: Option<String>,

    /// Embedding vector; never empty for a stored document
    pub embedding: Vec<f32>,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Id of the matched document
    pub id: i64,

    /// Cosine similarity in [-1, 1]
    pub score: f32,

    /// Document text
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// Provider and model that produced a store's vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
}

impl std::fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// What happened when the service came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedReport {
    /// The store was empty and the seed corpus was ingested.
    Seeded { added: usize, skipped: usize },

    /// The store already held documents; seeding was skipped.
    AlreadyPopulated { documents: u64 },
}

/// Result of ingesting a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Persisted under the given id
    Stored(i64),

    /// Not persisted because no usable embedding was produced
    Skipped,
}

/// Statistics for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStats {
    /// Base name
    pub base_name: String,

    /// Number of stored documents
    pub documents_count: u64,

    /// Dimensionality of stored embeddings, if any are stored
    pub dimensions: Option<usize>,

    /// Provider and model recorded for the stored embeddings
    pub embedding_model: Option<ModelInfo>,

    /// Database size in bytes
    pub db_size_bytes: u64,
}
