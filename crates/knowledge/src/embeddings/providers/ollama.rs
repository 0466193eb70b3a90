//! Ollama Embedding Provider
//!
//! Semantic embeddings from a local Ollama server (e.g. `nomic-embed-text`).
//!
//! Every failure (connection refused, HTTP error status, malformed body,
//! wrong vector width, timeout) is reported as `AppError::Embedding` after a
//! bounded number of retries with exponential backoff. The time budget is
//! shared between attempts, so a stalled request leaves room for a retry.

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use policykb_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Default attempts per text before giving up
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Floor for a single attempt's timeout
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);

/// Ollama embedding provider using the local HTTP API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    budget: Duration,
    max_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create a provider. No request is made until the first embedding.
    ///
    /// `base_url` falls back to `OLLAMA_URL`, then `http://localhost:11434`.
    /// `budget` bounds one `embed` call including retries and backoff.
    pub fn new(
        base_url: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
        budget: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
            budget,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))
    }

    /// Timeout for one HTTP request: the budget left after all backoff
    /// sleeps, split evenly between attempts.
    fn attempt_timeout(&self) -> Duration {
        let sleeping: Duration = (1..self.max_attempts).map(Self::backoff).sum();
        let per_attempt = self.budget.saturating_sub(sleeping) / self.max_attempts;
        per_attempt.max(MIN_ATTEMPT_TIMEOUT)
    }

    /// Override the number of attempts per text (minimum 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Embed single text with retry logic
    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed_with_retries(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt < self.max_attempts => {
                    let backoff = Self::backoff(attempt);
                    warn!(
                        "Embedding failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, self.max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Embed single text (no retries)
    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);

        let response = self
            .client
            .post(&url)
            .timeout(self.attempt_timeout())
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to reach Ollama at {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error)
                .unwrap_or(body);
            return Err(AppError::Embedding(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        if body.embedding.len() != self.dimensions {
            return Err(AppError::Embedding(format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                body.embedding.len(),
                self.dimensions
            )));
        }

        debug!("Generated {}-dimensional embedding", body.embedding.len());
        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }
        self.embed_with_retries(text).await
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        // The embeddings endpoint takes one prompt per request
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}
