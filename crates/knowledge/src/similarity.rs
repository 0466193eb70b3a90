//! Brute-force cosine ranking over the whole corpus.
//!
//! Each query costs O(N·D) for N documents of dimension D. That is fine for
//! the tens-to-hundreds of policy snippets this store holds; there is no
//! approximate index.

use crate::types::{SearchResult, StoredDocument};
use std::cmp::Ordering;

/// Separator placed between result contents in the joined answer.
pub const RESULT_SEPARATOR: &str = "\n\n";

/// Cosine similarity of two vectors.
///
/// Returns `None` when the similarity is undefined: mismatched lengths,
/// empty input, or a zero norm on either side. The result is clamped to
/// [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }

    Some((dot / denom).clamp(-1.0, 1.0))
}

/// Rank `corpus` against `query` and keep the `top_k` best.
///
/// Documents whose similarity is undefined are left out of this pass.
/// Equal scores are ordered by ascending id.
pub fn rank(query: &[f32], corpus: &[StoredDocument], top_k: usize) -> Vec<SearchResult> {
    if top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(&StoredDocument, f32)> = Vec::with_capacity(corpus.len());
    let mut excluded = 0usize;

    for doc in corpus {
        match cosine_similarity(query, &doc.embedding) {
            Some(score) => scored.push((doc, score)),
            None => excluded += 1,
        }
    }

    if excluded > 0 {
        tracing::warn!(
            "Excluded {} of {} documents with degenerate or mismatched vectors",
            excluded,
            corpus.len()
        );
    }

    scored.sort_by(|(da, sa), (db, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| da.id.cmp(&db.id))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(doc, score)| SearchResult {
            id: doc.id,
            score,
            content: doc.content.clone(),
            category: doc.category.clone(),
            question: doc.question.clone(),
        })
        .collect()
}

/// Drop results scoring below `min_score`, if a floor is configured.
pub fn apply_min_score(results: Vec<SearchResult>, min_score: Option<f32>) -> Vec<SearchResult> {
    match min_score {
        Some(floor) => results.into_iter().filter(|r| r.score >= floor).collect(),
        None => results,
    }
}

/// Concatenate result contents in ranked order.
pub fn join_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join(RESULT_SEPARATOR)
}
