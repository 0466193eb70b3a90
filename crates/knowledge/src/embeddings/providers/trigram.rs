//! Offline embedding provider built from hashed words and character trigrams.

use crate::embeddings::provider::EmbeddingProvider;
use policykb_core::AppResult;
use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "my", "your", "you", "what", "when", "how", "can",
    "does", "do", "will", "after", "per",
];

/// Deterministic, content-aware embeddings that need no model or network.
///
/// Each non-stop word contributes to one bucket for the whole word and one
/// bucket per character trigram, so texts sharing vocabulary (or word
/// stems) point in similar directions. Vectors are unit length; text with
/// no usable words yields the zero vector.
#[derive(Debug, Clone)]
pub struct TrigramProvider {
    dimensions: usize,
    model: String,
}

impl TrigramProvider {
    /// Create a new trigram provider with the given width.
    pub fn new(dimensions: usize) -> Self {
        Self::with_model(dimensions, "trigram-v1")
    }

    /// Create a provider reporting a custom model name.
    pub fn with_model(dimensions: usize, model: impl Into<String>) -> Self {
        Self {
            dimensions: dimensions.max(1),
            model: model.into(),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];

        for (word, freq) in term_frequencies(text) {
            let weight = freq as f32;
            vector[self.bucket(&word, 0x9e37)] += weight;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&trigram, 0x85eb)] += weight.sqrt();
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn bucket(&self, token: &str, seed: u64) -> usize {
        // FNV-1a, seeded so words and trigrams land in different buckets
        let hash = token.bytes().fold(0xcbf2_9ce4_8422_2325 ^ seed, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        (hash % self.dimensions as u64) as usize
    }
}

/// Lowercased alphanumeric words, minus stop words and very short tokens.
fn term_frequencies(text: &str) -> HashMap<String, u32> {
    let mut freq = HashMap::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
    {
        *freq.entry(word.to_string()).or_insert(0) += 1;
    }
    freq
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
