//! End-to-end behaviour of the knowledge base service.

use super::{FailingProvider, FixedProvider, HangingProvider, MisbehavingProvider};
use crate::seed::SeedCorpus;
use crate::service::{
    KnowledgeBase, ServiceOptions, ServiceState, SharedKnowledgeBase, NOT_FOUND_MESSAGE,
    QUERY_APOLOGY, STORE_UNAVAILABLE_MESSAGE,
};
use crate::types::{IngestOutcome, ModelInfo, NewDocument, SeedReport};
use crate::EmbeddingProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const BILL: &str =
    "Your bill is generated on the 1st of every month. Due Date is usually the 18th.";
const FORECLOSURE: &str =
    "Foreclosure of an EMI is allowed after the 1st month with a 1% fee.";
const LATE_FEE: &str = "Late fee is ₹500 for balances between ₹501 and ₹5,000.";
const BILL_QUERY: &str = "when is my bill due";

fn policy_provider() -> Arc<FixedProvider> {
    Arc::new(FixedProvider::new(&[
        (BILL, vec![0.9, 0.1, 0.0]),
        (FORECLOSURE, vec![0.1, 0.9, 0.1]),
        (LATE_FEE, vec![0.2, 0.2, 0.9]),
        (BILL_QUERY, vec![1.0, 0.0, 0.1]),
        ("foreclosure charges", vec![0.0, 1.0, 0.0]),
        ("card stolen", vec![0.0, 0.0, -1.0]),
        ("how do I redeem points", vec![0.1, 0.0, 0.95]),
        ("Reward points can be redeemed for statement credit.", vec![0.1, 0.0, 1.0]),
    ]))
}

fn policy_seed() -> SeedCorpus {
    SeedCorpus::new(vec![BILL, FORECLOSURE, LATE_FEE])
}

fn index_path(temp: &TempDir) -> PathBuf {
    temp.path().join("kb").join("index.sqlite")
}

fn options() -> ServiceOptions {
    ServiceOptions {
        name: "test".to_string(),
        default_top_k: 2,
        embed_timeout: Duration::from_secs(5),
        min_score: None,
    }
}

async fn open_policies(temp: &TempDir, provider: Arc<FixedProvider>) -> KnowledgeBase {
    KnowledgeBase::open(index_path(temp), provider, &policy_seed(), options())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bill_question_returns_due_date() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;

    let answer = kb.search(BILL_QUERY, 1).await;
    assert!(answer.contains("Due Date is usually the 18th"), "got: {}", answer);
    assert!(!answer.contains("Foreclosure"));
}

#[tokio::test]
async fn test_seeding_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let provider = policy_provider();

    let first = open_policies(&temp, Arc::clone(&provider)).await;
    assert_eq!(first.seed_report(), SeedReport::Seeded { added: 3, skipped: 0 });
    let count_after_first = first.store().count().unwrap();
    drop(first);

    let second = open_policies(&temp, Arc::clone(&provider)).await;
    assert_eq!(
        second.seed_report(),
        SeedReport::AlreadyPopulated { documents: 3 }
    );
    assert_eq!(second.store().count().unwrap(), count_after_first);

    // Reopening never re-embeds the seed corpus
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_failing_provider_never_raises() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        Arc::new(FailingProvider),
        &policy_seed(),
        options(),
    )
    .await
    .unwrap();

    assert_eq!(kb.seed_report(), SeedReport::Seeded { added: 0, skipped: 3 });
    assert_eq!(kb.store().count().unwrap(), 0);
    assert_eq!(kb.search("anything", 2).await, QUERY_APOLOGY);
    assert_eq!(kb.ingest("new policy").await.unwrap(), IngestOutcome::Skipped);
}

#[tokio::test]
async fn test_partial_seed_failure_skips_only_that_document() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(FixedProvider::new(&[
        (BILL, vec![0.9, 0.1, 0.0]),
        (LATE_FEE, vec![0.2, 0.2, 0.9]),
    ]));

    let kb = KnowledgeBase::open(index_path(&temp), provider, &policy_seed(), options())
        .await
        .unwrap();

    assert_eq!(kb.seed_report(), SeedReport::Seeded { added: 2, skipped: 1 });
    let contents: Vec<String> = kb
        .store()
        .scan_all()
        .unwrap()
        .into_iter()
        .map(|d| d.content)
        .collect();
    assert!(!contents.iter().any(|c| c.starts_with("Foreclosure")));
}

#[tokio::test]
async fn test_embedding_timeout_maps_to_apology() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        Arc::new(HangingProvider),
        &SeedCorpus::new(vec![BILL]),
        ServiceOptions {
            embed_timeout: Duration::from_millis(50),
            ..options()
        },
    )
    .await
    .unwrap();

    assert_eq!(kb.seed_report(), SeedReport::Seeded { added: 0, skipped: 1 });
    assert_eq!(kb.search(BILL_QUERY, 2).await, QUERY_APOLOGY);

    let err = kb.retrieve(BILL_QUERY, 2).await.unwrap_err();
    assert!(err.is_embedding_failure());
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_other_provider_errors_count_as_embedding_failures() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        Arc::new(MisbehavingProvider),
        &SeedCorpus::new(Vec::<String>::new()),
        options(),
    )
    .await
    .unwrap();

    let err = kb.retrieve("anything", 1).await.unwrap_err();
    assert!(err.is_embedding_failure());
    assert_eq!(kb.search("anything", 1).await, QUERY_APOLOGY);
}

#[tokio::test]
async fn test_ranking_order_and_top_k() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;

    let all = kb.retrieve(BILL_QUERY, 10).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].content, BILL);
    for pair in all.windows(2) {
        assert!(pair[0].score > pair[1].score);
    }

    let best = kb.retrieve("foreclosure charges", 1).await.unwrap();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].content, FORECLOSURE);

    let joined = kb.search(BILL_QUERY, 2).await;
    assert_eq!(joined, format!("{}\n\n{}", all[0].content, all[1].content));
}

#[tokio::test]
async fn test_default_top_k_from_options() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;

    let answer = kb.search_default(BILL_QUERY).await;
    assert_eq!(answer.split("\n\n").count(), 2);
}

#[tokio::test]
async fn test_no_results_returns_not_found() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        policy_provider(),
        &SeedCorpus::new(Vec::<String>::new()),
        options(),
    )
    .await
    .unwrap();

    assert_eq!(kb.search(BILL_QUERY, 2).await, NOT_FOUND_MESSAGE);
    assert_eq!(kb.search(BILL_QUERY, 0).await, NOT_FOUND_MESSAGE);
}

#[tokio::test]
async fn test_min_score_filters_irrelevant_hits() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        policy_provider(),
        &policy_seed(),
        ServiceOptions {
            min_score: Some(0.5),
            ..options()
        },
    )
    .await
    .unwrap();

    // Points away from every stored document
    assert_eq!(kb.search("card stolen", 3).await, NOT_FOUND_MESSAGE);

    let hits = kb.retrieve(BILL_QUERY, 3).await.unwrap();
    assert!(hits.iter().all(|h| h.score >= 0.5));
    assert_eq!(hits[0].content, BILL);
}

#[tokio::test]
async fn test_ingest_after_ready_is_searchable() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;

    let outcome = kb
        .ingest("Reward points can be redeemed for statement credit.")
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Stored(id) if id > 3));
    assert_eq!(kb.ingest("   ").await.unwrap(), IngestOutcome::Skipped);

    let answer = kb.search("how do I redeem points", 1).await;
    assert!(answer.contains("statement credit"), "got: {}", answer);
}

#[tokio::test]
async fn test_degenerate_stored_vector_is_excluded() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;

    kb.store().add("zero vector", &[0.0, 0.0, 0.0]).unwrap();

    let results = kb.retrieve(BILL_QUERY, 10).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.content != "zero vector"));
}

#[tokio::test]
async fn test_zero_vector_from_provider_is_skipped() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(FixedProvider::new(&[
        (BILL, vec![0.9, 0.1, 0.0]),
        ("blank meaning", vec![0.0, 0.0, 0.0]),
    ]));
    let kb = KnowledgeBase::open(
        index_path(&temp),
        provider,
        &SeedCorpus::new(vec![BILL, "blank meaning"]),
        options(),
    )
    .await
    .unwrap();

    assert_eq!(kb.seed_report(), SeedReport::Seeded { added: 1, skipped: 1 });
}

#[tokio::test]
async fn test_storage_failure_during_search() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;

    std::fs::remove_file(index_path(&temp)).unwrap();

    let err = kb.retrieve(BILL_QUERY, 2).await.unwrap_err();
    assert!(err.is_storage_failure());
    assert_eq!(kb.search(BILL_QUERY, 2).await, STORE_UNAVAILABLE_MESSAGE);
}

#[tokio::test]
async fn test_reopen_with_mismatched_provider_fails() {
    let temp = TempDir::new().unwrap();
    drop(open_policies(&temp, policy_provider()).await);

    let result = KnowledgeBase::open(
        index_path(&temp),
        Arc::new(crate::embeddings::providers::TrigramProvider::new(384)),
        &policy_seed(),
        options(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("384"), "got: {}", err);
}

#[tokio::test]
async fn test_reopen_with_other_model_of_same_width_fails() {
    let temp = TempDir::new().unwrap();
    let kb = open_policies(&temp, policy_provider()).await;
    assert_eq!(
        kb.store().embedding_model().unwrap(),
        Some(ModelInfo {
            provider: "fixed".to_string(),
            model: "fixed-table".to_string(),
        })
    );
    drop(kb);

    let result = KnowledgeBase::open(
        index_path(&temp),
        Arc::new(crate::embeddings::providers::TrigramProvider::with_model(
            3,
            "some-other-model",
        )),
        &policy_seed(),
        options(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, policykb_core::AppError::Config(_)));
    assert!(err.to_string().contains("some-other-model"), "got: {}", err);
    assert!(err.to_string().contains("fixed/fixed-table"), "got: {}", err);
}

#[tokio::test]
async fn test_store_without_recorded_model_adopts_provider() {
    let temp = TempDir::new().unwrap();
    let store = crate::store::DocumentStore::open(index_path(&temp)).unwrap();
    store.add(BILL, &[0.9, 0.1, 0.0]).unwrap();

    let kb = open_policies(&temp, policy_provider()).await;
    assert_eq!(kb.seed_report(), SeedReport::AlreadyPopulated { documents: 1 });
    assert_eq!(
        kb.store().embedding_model().unwrap().map(|m| m.to_string()),
        Some("fixed/fixed-table".to_string())
    );
}

#[tokio::test]
async fn test_empty_store_records_new_model() {
    let temp = TempDir::new().unwrap();
    drop(
        KnowledgeBase::open(
            index_path(&temp),
            Arc::new(FailingProvider),
            &policy_seed(),
            options(),
        )
        .await
        .unwrap(),
    );

    // Nothing was stored, so a different provider may take over
    let kb = open_policies(&temp, policy_provider()).await;
    assert_eq!(kb.seed_report(), SeedReport::Seeded { added: 3, skipped: 0 });
    assert_eq!(
        kb.store().embedding_model().unwrap().map(|m| m.model),
        Some("fixed-table".to_string())
    );
}

fn categorised_seed() -> SeedCorpus {
    SeedCorpus::from_documents(vec![
        NewDocument::new(BILL)
            .in_category("billing")
            .answering("When is my bill due?"),
        NewDocument::new(FORECLOSURE).in_category("emi"),
        NewDocument::new(LATE_FEE).in_category("fees"),
    ])
}

#[tokio::test]
async fn test_category_filter_excludes_other_categories() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        policy_provider(),
        &categorised_seed(),
        options(),
    )
    .await
    .unwrap();

    // The bill is the best overall match but lives in another category
    let fees = kb.retrieve_in(BILL_QUERY, 10, Some("fees")).await.unwrap();
    assert_eq!(fees.len(), 1);
    assert!(fees.iter().all(|r| r.category.as_deref() == Some("fees")));
    assert_eq!(fees[0].content, LATE_FEE);

    let answer = kb.search_in(BILL_QUERY, 3, Some("emi")).await;
    assert_eq!(answer, FORECLOSURE);

    let billing = kb.retrieve_in(BILL_QUERY, 1, Some("billing")).await.unwrap();
    assert_eq!(billing[0].question.as_deref(), Some("When is my bill due?"));

    assert_eq!(kb.search_in(BILL_QUERY, 3, Some("rewards")).await, NOT_FOUND_MESSAGE);
    assert_eq!(kb.retrieve(BILL_QUERY, 10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_ingested_document_keeps_category() {
    let temp = TempDir::new().unwrap();
    let kb = KnowledgeBase::open(
        index_path(&temp),
        policy_provider(),
        &categorised_seed(),
        options(),
    )
    .await
    .unwrap();

    let reward = NewDocument::new("Reward points can be redeemed for statement credit.")
        .in_category("rewards");
    assert!(matches!(
        kb.ingest_document(&reward).await.unwrap(),
        IngestOutcome::Stored(_)
    ));

    let hits = kb
        .retrieve_in("how do I redeem points", 5, Some("rewards"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("statement credit"));
}

#[tokio::test]
async fn test_unopenable_store_is_fatal() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, "file, not directory").unwrap();

    let result = KnowledgeBase::open(
        blocker.join("index.sqlite"),
        policy_provider(),
        &policy_seed(),
        options(),
    )
    .await;

    assert!(result.unwrap_err().is_storage_failure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_initialises_once_under_concurrency() {
    let temp = TempDir::new().unwrap();
    let provider = policy_provider();
    let shared = Arc::new(SharedKnowledgeBase::new(
        index_path(&temp),
        Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
        policy_seed(),
        options(),
    ));
    assert_eq!(shared.state(), ServiceState::Uninitialized);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { shared.search(BILL_QUERY, 1).await })
        })
        .collect();

    for handle in handles {
        let answer = handle.await.unwrap();
        assert!(answer.contains("18th"), "got: {}", answer);
    }

    assert_eq!(shared.state(), ServiceState::Ready);
    let kb = shared.get().await.unwrap();
    assert_eq!(kb.store().count().unwrap(), 3);
    // Three seed embeddings plus one per query
    assert_eq!(provider.calls(), 3 + 8);
}

#[tokio::test]
async fn test_shared_retries_after_failed_open() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, "file, not directory").unwrap();

    let shared = SharedKnowledgeBase::new(
        blocker.join("index.sqlite"),
        policy_provider(),
        policy_seed(),
        options(),
    );

    assert_eq!(shared.search(BILL_QUERY, 1).await, STORE_UNAVAILABLE_MESSAGE);
    assert_eq!(shared.state(), ServiceState::Uninitialized);

    std::fs::remove_file(&blocker).unwrap();
    let answer = shared.search(BILL_QUERY, 1).await;
    assert!(answer.contains("18th"), "got: {}", answer);
    assert_eq!(shared.state(), ServiceState::Ready);
}

#[tokio::test]
async fn test_shared_category_search() {
    let temp = TempDir::new().unwrap();
    let shared = SharedKnowledgeBase::new(
        index_path(&temp),
        policy_provider(),
        categorised_seed(),
        options(),
    );

    assert_eq!(shared.search_in(BILL_QUERY, 2, Some("emi")).await, FORECLOSURE);
}
