//! Seed corpus loaded into an empty store on first start.

use crate::types::NewDocument;
use policykb_core::{AppError, AppResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Built-in OneCard credit card policy snippets, by category.
const BUILTIN_POLICIES: &[(&str, &str)] = &[
    (
        "billing",
        "Your bill is generated on the 1st of every month. Due Date is usually the 18th of the same month.",
    ),
    (
        "emi",
        "Foreclosure of an EMI is allowed after the 1st month with a 1% fee on the outstanding principal.",
    ),
    (
        "fees",
        "For an outstanding balance between ₹501 and ₹5,000 the Late Fee is ₹500. Above ₹5,000 it is ₹750.",
    ),
    ("fees", "International transactions attract a forex markup fee of 1% + GST."),
    (
        "card",
        "Replacement of a lost metal card costs ₹3,000 + GST. Plastic card replacement is free.",
    ),
    (
        "emi",
        "Transactions above ₹2,500 can be converted into EMI for 3, 6, 9 or 12 months from the app.",
    ),
    (
        "card",
        "Freezing your card is temporary and can be undone anytime from the app. Blocking is permanent and a new card will be issued.",
    ),
    (
        "disputes",
        "To dispute a transaction, report it within 30 days of the statement date. The amount is held while we investigate.",
    ),
    (
        "rewards",
        "Reward points are credited within 7 days of a transaction and never expire while the account is active.",
    ),
    (
        "card",
        "A new physical card is delivered within 7 working days of account approval. Track delivery status in the app.",
    ),
    (
        "billing",
        "The minimum amount due is 5% of the total outstanding. Paying only the minimum attracts interest on the remaining balance.",
    ),
    (
        "payments",
        "Payments made via UPI are reflected instantly. Bank transfers may take up to 2 working days.",
    ),
];

/// Fixed document set used to populate an empty store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedCorpus {
    documents: Vec<NewDocument>,
}

/// On-disk layouts accepted by [`SeedCorpus::from_file`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedFile {
    /// `["policy text", ...]`
    Flat(Vec<String>),
    /// `{"category": {"question": "answer", ...}, ...}`
    Categorized(BTreeMap<String, BTreeMap<String, String>>),
}

impl SeedCorpus {
    /// Build an uncategorised corpus from plain strings; blank entries are
    /// dropped.
    pub fn new<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_documents(documents.into_iter().map(NewDocument::new))
    }

    /// Build a corpus from prepared documents; blank entries are dropped.
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = NewDocument>,
    {
        Self {
            documents: documents
                .into_iter()
                .map(|mut d| {
                    d.content = d.content.trim().to_string();
                    d
                })
                .filter(|d| !d.content.is_empty())
                .collect(),
        }
    }

    /// The built-in policy corpus.
    pub fn builtin() -> Self {
        Self::from_documents(
            BUILTIN_POLICIES
                .iter()
                .map(|(category, text)| NewDocument::new(*text).in_category(*category)),
        )
    }

    /// Load a corpus from a JSON file.
    ///
    /// Accepts a flat array of strings, or an object of categories each
    /// mapping questions to answers; every answer becomes one document
    /// filed under its category, with its question kept alongside.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read seed corpus {:?}: {}", path, e))
        })?;
        let corpus = Self::from_json(&content)?;
        tracing::debug!("Loaded {} seed documents from {:?}", corpus.len(), path);
        Ok(corpus)
    }

    /// Parse a corpus from JSON text.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let file: SeedFile = serde_json::from_str(json)?;
        Ok(match file {
            SeedFile::Flat(documents) => Self::new(documents),
            SeedFile::Categorized(categories) => {
                Self::from_documents(categories.into_iter().flat_map(|(category, qa)| {
                    qa.into_iter().map(move |(question, answer)| {
                        NewDocument::new(answer)
                            .in_category(category.clone())
                            .answering(question)
                    })
                }))
            }
        })
    }

    /// Load from `path` when given, otherwise use the built-in corpus.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn documents(&self) -> &[NewDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for SeedCorpus {
    fn default() -> Self {
        Self::builtin()
    }
}
