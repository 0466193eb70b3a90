//! Embedding provider trait and factory.

use crate::embeddings::providers::{OllamaProvider, TrigramProvider};
use crate::types::KnowledgeBaseConfig;
use policykb_core::{AppError, AppResult};
use std::sync::Arc;

/// Turns text into a fixed-width vector.
///
/// Implementations report failures as `AppError::Embedding`; callers decide
/// whether a failure skips a document or becomes a user-facing message.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider based on configuration.
pub fn create_provider(config: &KnowledgeBaseConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.embedding_dim as usize;

    match config.provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramProvider::with_model(
            dimensions,
            config.model.clone(),
        ))),

        "ollama" => {
            let provider = OllamaProvider::new(
                config.ollama_url.clone(),
                config.model.clone(),
                dimensions,
                config.embed_timeout(),
            )?;
            Ok(Arc::new(provider))
        }

        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            other
        ))),
    }
}
