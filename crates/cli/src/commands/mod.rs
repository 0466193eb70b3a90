//! Command handlers for the policykb CLI.

pub mod ingest;
pub mod search;
pub mod stats;

pub use ingest::IngestCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use policykb_core::{config::AppConfig, AppResult};
use policykb_knowledge::{config::load_config, KnowledgeBaseConfig};

/// Per-base config with the global provider/model overrides applied.
pub(crate) fn base_config(
    config: &AppConfig,
    base: Option<&str>,
) -> AppResult<KnowledgeBaseConfig> {
    let name = base.unwrap_or(config.base.as_str());
    let kb_config = load_config(&config.workspace, name)?
        .with_overrides(config.provider.as_deref(), config.model.as_deref());
    tracing::debug!("Knowledge base config: {:?}", kb_config);
    Ok(kb_config)
}
