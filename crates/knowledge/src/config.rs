//! Knowledge base configuration management.

use crate::types::KnowledgeBaseConfig;
use policykb_core::config::STATE_DIR;
use policykb_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load knowledge base configuration.
///
/// Loads from `.policykb/knowledge/<base>/config.yaml` if it exists,
/// otherwise returns a default config carrying the provided base name.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace, base_name);

    if !config_path.exists() {
        tracing::debug!(
            "Using default knowledge base config for '{}' (no config file found)",
            base_name
        );
        return Ok(KnowledgeBaseConfig {
            name: base_name.to_string(),
            ..Default::default()
        });
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    // The directory name is authoritative
    config.name = base_name.to_string();

    // Relative seed paths are resolved against the workspace
    if let Some(seed) = config.seed_path.take() {
        config.seed_path = Some(if seed.is_relative() {
            workspace.join(seed)
        } else {
            seed
        });
    }

    tracing::debug!("Loaded knowledge base config for '{}'", base_name);
    Ok(config)
}

/// Save knowledge base configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved knowledge base config for '{}'", config.name);
    Ok(())
}

impl KnowledgeBaseConfig {
    /// Apply provider/model overrides coming from the global configuration.
    ///
    /// Switching provider without naming a model resets the model to that
    /// provider's default, since model names are provider-specific.
    pub fn with_overrides(mut self, provider: Option<&str>, model: Option<&str>) -> Self {
        if let Some(provider) = provider {
            if provider != self.provider {
                self.provider = provider.to_string();
                self.model = default_model(provider).to_string();
                if provider == "ollama" && self.embedding_dim == 384 {
                    self.embedding_dim = 768;
                }
            }
        }
        if let Some(model) = model {
            self.model = model.to_string();
        }
        self
    }

    /// Timeout applied to each embedding call.
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs.max(1))
    }
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "ollama" => "nomic-embed-text",
        _ => "trigram-v1",
    }
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace.join(STATE_DIR).join("knowledge").join(base_name)
}

/// Get the path to a base's config file.
pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

/// Get the SQLite store path for a base.
pub fn get_index_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("index.sqlite")
}
