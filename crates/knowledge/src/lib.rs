//! Policy knowledge base.
//!
//! Answers free-text questions from a fixed corpus of policy snippets by
//! embedding similarity. Documents and their vectors live in SQLite; each
//! query is embedded and ranked against the whole corpus by cosine
//! similarity.
//!
//! ```text
//! seed corpus -> EmbeddingProvider -> DocumentStore          (once)
//! query -> EmbeddingProvider -> rank(scan_all) -> joined text
//! ```

pub mod config;
pub mod embeddings;
pub mod seed;
pub mod service;
pub mod similarity;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use seed::SeedCorpus;
pub use service::{
    KnowledgeBase, ServiceOptions, ServiceState, SharedKnowledgeBase, NOT_FOUND_MESSAGE,
    QUERY_APOLOGY, STORE_UNAVAILABLE_MESSAGE,
};
pub use store::DocumentStore;
pub use types::{
    BaseStats, IngestOutcome, KnowledgeBaseConfig, ModelInfo, NewDocument, SearchResult,
    SeedReport, StoredDocument,
};

use policykb_core::{AppError, AppResult};
use std::path::Path;

/// Open (and seed if empty) the knowledge base described by `config`.
pub async fn open(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<KnowledgeBase> {
    tracing::info!(
        "Opening knowledge base '{}' (provider: {}, model: {})",
        config.name,
        config.provider,
        config.model
    );

    let provider = create_provider(config)?;
    let seed = SeedCorpus::load(config.seed_path.as_deref())?;
    let index_path = config::get_index_path(workspace, &config.name);

    KnowledgeBase::open(index_path, provider, &seed, ServiceOptions::from(config)).await
}

/// A lazily opened knowledge base for long-running callers.
pub fn shared(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<SharedKnowledgeBase> {
    let provider = create_provider(config)?;
    let seed = SeedCorpus::load(config.seed_path.as_deref())?;
    let index_path = config::get_index_path(workspace, &config.name);

    Ok(SharedKnowledgeBase::new(
        index_path,
        provider,
        seed,
        ServiceOptions::from(config),
    ))
}

/// Statistics for an existing knowledge base, without seeding it.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    DocumentStore::open(&index_path)?.stats(base_name)
}
