//! Stats command handler.

use clap::Args;
use policykb_core::{config::AppConfig, AppResult};

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Knowledge base name
    #[arg(long)]
    pub base: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = self.base.as_deref().unwrap_or(config.base.as_str());
        tracing::info!("Executing stats command for base '{}'", base);

        let stats = policykb_knowledge::stats(&config.workspace, base)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Knowledge Base: {}", stats.base_name);
            println!("Documents: {}", stats.documents_count);
            match stats.dimensions {
                Some(dims) => println!("Dimensions: {}", dims),
                None => println!("Dimensions: (empty)"),
            }
            if let Some(model) = &stats.embedding_model {
                println!("Embedding Model: {}", model);
            }
            println!("Database Size: {} bytes", stats.db_size_bytes);
        }

        Ok(())
    }
}
