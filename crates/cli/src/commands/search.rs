//! Search command handler.

use clap::Args;
use policykb_core::{config::AppConfig, AppResult};

/// Answer a question from the knowledge base
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Question text
    pub query: String,

    /// Number of documents to return (default: the base's top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Knowledge base name
    #[arg(long)]
    pub base: Option<String>,

    /// Only search documents filed under this category
    #[arg(long)]
    pub category: Option<String>,

    /// Output ranked results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let kb_config = super::base_config(config, self.base.as_deref())?;
        tracing::info!("Executing search command for base '{}'", kb_config.name);

        let kb = policykb_knowledge::open(&config.workspace, &kb_config).await?;
        let top_k = self.top_k.unwrap_or(kb.options().default_top_k);
        let category = self.category.as_deref();

        if self.json {
            let results = kb.retrieve_in(&self.query, top_k, category).await?;
            let output = serde_json::json!({
                "base": kb_config.name,
                "query": self.query,
                "category": category,
                "results": results,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", kb.search_in(&self.query, top_k, category).await);
        }

        Ok(())
    }
}
