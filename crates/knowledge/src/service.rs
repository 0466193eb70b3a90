//! Knowledge base service: seeding, ingestion and search.
//!
//! Lifecycle of a [`KnowledgeBase`]:
//!
//! ```text
//! Uninitialized -> Opening -> Empty -> Seeding -> Ready
//!                          \-> NonEmpty ---------> Ready
//! ```
//!
//! [`KnowledgeBase::open`] only returns once `Ready` is reached, so a value of
//! that type can never be searched while half seeded. [`SharedKnowledgeBase`]
//! defers the whole sequence to the first caller and makes every concurrent
//! caller wait for it.

use crate::embeddings::EmbeddingProvider;
use crate::seed::SeedCorpus;
use crate::similarity::{apply_min_score, join_results, rank};
use crate::store::DocumentStore;
use crate::types::{
    BaseStats, IngestOutcome, KnowledgeBaseConfig, ModelInfo, NewDocument, SearchResult,
    SeedReport,
};
use policykb_core::{AppError, AppResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Returned by `search` when the query could not be embedded.
pub const QUERY_APOLOGY: &str =
    "Sorry, I could not process your question right now. Please try again in a moment.";

/// Returned by `search` when nothing relevant was found.
pub const NOT_FOUND_MESSAGE: &str =
    "I couldn't find anything about that in our policy documents.";

/// Returned by `search` when the store cannot be read.
pub const STORE_UNAVAILABLE_MESSAGE: &str =
    "Sorry, our policy information is unavailable right now. Please try again later.";

/// Lifecycle states of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Opening,
    Empty,
    NonEmpty,
    Seeding,
    Ready,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Opening => "opening",
            ServiceState::Empty => "empty",
            ServiceState::NonEmpty => "non-empty",
            ServiceState::Seeding => "seeding",
            ServiceState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Tunables for a [`KnowledgeBase`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOptions {
    /// Knowledge base name, used in logs and stats
    pub name: String,

    /// Result count used by [`KnowledgeBase::search_default`]
    pub default_top_k: usize,

    /// Upper bound on one embedding call
    pub embed_timeout: Duration,

    /// Optional relevance floor
    pub min_score: Option<f32>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::from(&KnowledgeBaseConfig::default())
    }
}

impl From<&KnowledgeBaseConfig> for ServiceOptions {
    fn from(config: &KnowledgeBaseConfig) -> Self {
        Self {
            name: config.name.clone(),
            default_top_k: config.top_k as usize,
            embed_timeout: config.embed_timeout(),
            min_score: config.min_score,
        }
    }
}

/// A ready-to-query knowledge base.
#[derive(Debug)]
pub struct KnowledgeBase {
    store: DocumentStore,
    provider: Arc<dyn EmbeddingProvider>,
    options: ServiceOptions,
    seed_report: SeedReport,
}

impl KnowledgeBase {
    /// Open the store at `store_path` and seed it if it is empty.
    ///
    /// Seed documents whose embedding fails are skipped. Storage failures,
    /// and a store whose vectors came from a different model or have a
    /// different width than the provider's, are fatal.
    pub async fn open(
        store_path: impl AsRef<Path>,
        provider: Arc<dyn EmbeddingProvider>,
        seed: &SeedCorpus,
        options: ServiceOptions,
    ) -> AppResult<Self> {
        let mut state = ServiceState::Uninitialized;
        advance(&options.name, &mut state, ServiceState::Opening);

        let store_path = store_path.as_ref().to_path_buf();
        let store = blocking(move || DocumentStore::open(store_path)).await?;

        let mut kb = Self {
            store,
            provider,
            options,
            seed_report: SeedReport::AlreadyPopulated { documents: 0 },
        };

        let reader = kb.store.clone();
        if blocking(move || reader.is_empty()).await? {
            advance(&kb.options.name, &mut state, ServiceState::Empty);
            let writer = kb.store.clone();
            let model = kb.model_info();
            blocking(move || writer.set_embedding_model(&model)).await?;

            advance(&kb.options.name, &mut state, ServiceState::Seeding);
            kb.seed_report = kb.seed(seed).await?;
        } else {
            advance(&kb.options.name, &mut state, ServiceState::NonEmpty);
            kb.check_dimensions().await?;
            kb.check_model().await?;
            let reader = kb.store.clone();
            let documents = blocking(move || reader.count()).await?;
            kb.seed_report = SeedReport::AlreadyPopulated { documents };
        }

        advance(&kb.options.name, &mut state, ServiceState::Ready);
        Ok(kb)
    }

    async fn seed(&self, seed: &SeedCorpus) -> AppResult<SeedReport> {
        let mut added = 0usize;
        let mut skipped = 0usize;

        for document in seed.documents() {
            match self.ingest_document(document).await? {
                IngestOutcome::Stored(_) => added += 1,
                IngestOutcome::Skipped => skipped += 1,
            }
        }

        tracing::info!(
            "Seeded knowledge base '{}': {} documents added, {} skipped",
            self.options.name,
            added,
            skipped
        );
        Ok(SeedReport::Seeded { added, skipped })
    }

    async fn check_dimensions(&self) -> AppResult<()> {
        let reader = self.store.clone();
        if let Some(stored) = blocking(move || reader.dimensions()).await? {
            let expected = self.provider.dimensions();
            if stored != expected {
                return Err(AppError::Config(format!(
                    "Store {:?} holds {}-dimensional embeddings but provider '{}' (model '{}') produces {}",
                    self.store.path(),
                    stored,
                    self.provider.provider_name(),
                    self.provider.model_name(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Reject a store whose vectors were produced by another model.
    ///
    /// Stores written before the model was recorded adopt the current one.
    async fn check_model(&self) -> AppResult<()> {
        let current = self.model_info();
        let reader = self.store.clone();

        match blocking(move || reader.embedding_model()).await? {
            Some(recorded) if recorded != current => Err(AppError::Config(format!(
                "Store {:?} was built with embeddings from '{}' but the configured provider is '{}'",
                self.store.path(),
                recorded,
                current
            ))),
            Some(_) => Ok(()),
            None => {
                tracing::warn!(
                    "Store {:?} has no recorded embedding model; assuming '{}'",
                    self.store.path(),
                    current
                );
                let writer = self.store.clone();
                blocking(move || writer.set_embedding_model(&current)).await
            }
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider.provider_name().to_string(),
            model: self.provider.model_name().to_string(),
        }
    }

    /// What happened during startup.
    pub fn seed_report(&self) -> SeedReport {
        self.seed_report
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Embed `text`, enforcing the timeout and rejecting unusable vectors.
    async fn embed_checked(&self, text: &str) -> AppResult<Vec<f32>> {
        let timeout = self.options.embed_timeout;
        let embedding = match tokio::time::timeout(timeout, self.provider.embed(text)).await {
            Err(_) => {
                return Err(AppError::Embedding(format!(
                    "Embedding timed out after {:?}",
                    timeout
                )))
            }
            Ok(Err(e)) if e.is_embedding_failure() => return Err(e),
            Ok(Err(e)) => return Err(AppError::Embedding(e.to_string())),
            Ok(Ok(embedding)) => embedding,
        };

        if embedding.is_empty() {
            return Err(AppError::Embedding("Provider returned an empty vector".to_string()));
        }
        if embedding.len() != self.provider.dimensions() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} dimensions, expected {}",
                embedding.len(),
                self.provider.dimensions()
            )));
        }
        if embedding.iter().all(|v| *v == 0.0) {
            return Err(AppError::Embedding("Provider returned a zero vector".to_string()));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Embedding("Provider returned non-finite values".to_string()));
        }

        Ok(embedding)
    }

    /// Embed and store one uncategorised document.
    pub async fn ingest(&self, content: &str) -> AppResult<IngestOutcome> {
        self.ingest_document(&NewDocument::new(content)).await
    }

    /// Embed and store one document with its category and question.
    ///
    /// An embedding failure skips the document (logged, nothing written);
    /// a storage failure is returned to the caller.
    pub async fn ingest_document(&self, document: &NewDocument) -> AppResult<IngestOutcome> {
        let content = document.content.trim();
        if content.is_empty() {
            tracing::warn!("Skipping empty document");
            return Ok(IngestOutcome::Skipped);
        }

        let embedding = match self.embed_checked(content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("Skipping document, no embedding: {}", e);
                return Ok(IngestOutcome::Skipped);
            }
        };

        let writer = self.store.clone();
        let owned = NewDocument {
            content: content.to_string(),
            ..document.clone()
        };
        let id = blocking(move || writer.add_document(&owned, &embedding)).await?;
        Ok(IngestOutcome::Stored(id))
    }

    /// Rank stored documents against `query` and return the best `top_k`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> AppResult<Vec<SearchResult>> {
        self.retrieve_in(query, top_k, None).await
    }

    /// [`retrieve`](Self::retrieve) restricted to one category when given.
    pub async fn retrieve_in(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> AppResult<Vec<SearchResult>> {
        let query_embedding = self.embed_checked(query).await?;

        let reader = self.store.clone();
        let filter = category.map(str::to_string);
        let corpus = blocking(move || reader.scan(filter.as_deref())).await?;

        let ranked = rank(&query_embedding, &corpus, top_k);
        let results = apply_min_score(ranked, self.options.min_score);

        tracing::debug!(
            "Query ranked {} documents, kept {} (scores: {:?})",
            corpus.len(),
            results.len(),
            results.iter().map(|r| r.score).collect::<Vec<_>>()
        );

        Ok(results)
    }

    /// Answer `query` with the `top_k` best documents joined into one text.
    ///
    /// Never fails: embedding failures, storage failures and empty results
    /// each map to a fixed user-facing message.
    pub async fn search(&self, query: &str, top_k: usize) -> String {
        self.search_in(query, top_k, None).await
    }

    /// [`search`](Self::search) restricted to one category when given.
    pub async fn search_in(&self, query: &str, top_k: usize, category: Option<&str>) -> String {
        match self.retrieve_in(query, top_k, category).await {
            Ok(results) if results.is_empty() => NOT_FOUND_MESSAGE.to_string(),
            Ok(results) => join_results(&results),
            Err(e) if e.is_embedding_failure() => {
                tracing::warn!("Could not embed query: {}", e);
                QUERY_APOLOGY.to_string()
            }
            Err(e) => {
                tracing::error!("Search failed: {}", e);
                STORE_UNAVAILABLE_MESSAGE.to_string()
            }
        }
    }

    /// [`search`](Self::search) with the configured default result count.
    pub async fn search_default(&self, query: &str) -> String {
        self.search(query, self.options.default_top_k).await
    }

    /// Document count, vector width and on-disk size.
    pub async fn stats(&self) -> AppResult<BaseStats> {
        let reader = self.store.clone();
        let name = self.options.name.clone();
        blocking(move || reader.stats(&name)).await
    }
}

fn advance(name: &str, state: &mut ServiceState, next: ServiceState) {
    tracing::info!("Knowledge base '{}': {} -> {}", name, state, next);
    *state = next;
}

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(op: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| AppError::Storage(format!("Store task failed: {}", e)))?
}

/// A knowledge base opened lazily, exactly once, on first use.
///
/// Concurrent first callers all await the same initialisation. If opening
/// fails the cell stays empty and the next call tries again.
#[derive(Debug)]
pub struct SharedKnowledgeBase {
    cell: OnceCell<KnowledgeBase>,
    store_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    seed: SeedCorpus,
    options: ServiceOptions,
}

impl SharedKnowledgeBase {
    pub fn new(
        store_path: impl Into<PathBuf>,
        provider: Arc<dyn EmbeddingProvider>,
        seed: SeedCorpus,
        options: ServiceOptions,
    ) -> Self {
        Self {
            cell: OnceCell::new(),
            store_path: store_path.into(),
            provider,
            seed,
            options,
        }
    }

    /// `Ready` once initialisation has completed, `Uninitialized` before.
    pub fn state(&self) -> ServiceState {
        if self.cell.initialized() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        }
    }

    /// The knowledge base, opening and seeding it first if needed.
    pub async fn get(&self) -> AppResult<&KnowledgeBase> {
        self.cell
            .get_or_try_init(|| {
                KnowledgeBase::open(
                    self.store_path.clone(),
                    Arc::clone(&self.provider),
                    &self.seed,
                    self.options.clone(),
                )
            })
            .await
    }

    /// Total search; initialisation failures become a user-facing message.
    pub async fn search(&self, query: &str, top_k: usize) -> String {
        self.search_in(query, top_k, None).await
    }

    /// [`search`](Self::search) restricted to one category when given.
    pub async fn search_in(&self, query: &str, top_k: usize, category: Option<&str>) -> String {
        match self.get().await {
            Ok(kb) => kb.search_in(query, top_k, category).await,
            Err(e) => {
                tracing::error!("Knowledge base unavailable: {}", e);
                STORE_UNAVAILABLE_MESSAGE.to_string()
            }
        }
    }
}
