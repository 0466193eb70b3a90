//! Ingest command handler.
//!
//! Appends documents to a knowledge base, seeding it first if it is new.

use clap::Args;
use policykb_core::{config::AppConfig, AppError, AppResult};
use policykb_knowledge::{IngestOutcome, NewDocument, SeedCorpus};
use std::path::PathBuf;

/// Add a document to the knowledge base
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Document text
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub text: Option<String>,

    /// JSON file of documents (flat list or categorised questions/answers)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Category to file the text under
    #[arg(long, conflicts_with = "file")]
    pub category: Option<String>,

    /// Question the text answers
    #[arg(long, conflicts_with = "file")]
    pub question: Option<String>,

    /// Knowledge base name
    #[arg(long)]
    pub base: Option<String>,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let kb_config = super::base_config(config, self.base.as_deref())?;
        tracing::info!("Executing ingest command for base '{}'", kb_config.name);

        let documents = match (&self.text, &self.file) {
            (Some(text), _) => vec![NewDocument {
                content: text.clone(),
                category: self.category.clone(),
                question: self.question.clone(),
            }],
            (None, Some(path)) => SeedCorpus::from_file(path)?.documents().to_vec(),
            (None, None) => {
                return Err(AppError::Config(
                    "Nothing to ingest: pass a text or --file".to_string(),
                ))
            }
        };

        let kb = policykb_knowledge::open(&config.workspace, &kb_config).await?;

        let mut stored = 0usize;
        let mut skipped = 0usize;
        for document in &documents {
            match kb.ingest_document(document).await? {
                IngestOutcome::Stored(id) => {
                    tracing::debug!("Stored document {}", id);
                    stored += 1;
                }
                IngestOutcome::Skipped => skipped += 1,
            }
        }

        println!(
            "Ingested {} documents into '{}' ({} skipped)",
            stored, kb_config.name, skipped
        );

        Ok(())
    }
}
