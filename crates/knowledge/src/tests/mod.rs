//! Cross-module tests with stub embedding providers.

mod service;

use crate::embeddings::EmbeddingProvider;
use policykb_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns hand-picked vectors for known strings and fails for anything else.
#[derive(Debug)]
pub(crate) struct FixedProvider {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
    calls: AtomicUsize,
}

impl FixedProvider {
    pub(crate) fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        let dimensions = entries.first().map(|(_, v)| v.len()).unwrap_or(3);
        Self {
            vectors: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.clone()))
                .collect(),
            dimensions,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FixedProvider {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed-table"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.vectors
                    .get(text)
                    .cloned()
                    .ok_or_else(|| AppError::Embedding(format!("No vector for '{}'", text)))
            })
            .collect()
    }
}

/// Every call fails, as if the quota were exhausted.
#[derive(Debug)]
pub(crate) struct FailingProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for FailingProvider {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Embedding("quota exceeded".to_string()))
    }
}

/// Never answers.
#[derive(Debug)]
pub(crate) struct HangingProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for HangingProvider {
    fn provider_name(&self) -> &str {
        "hanging"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        std::future::pending().await
    }
}

/// Fails with a non-embedding error variant.
#[derive(Debug)]
pub(crate) struct MisbehavingProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for MisbehavingProvider {
    fn provider_name(&self) -> &str {
        "misbehaving"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Other("socket closed".to_string()))
    }
}
