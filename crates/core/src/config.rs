//! Configuration management for the policy knowledge base CLI.
//!
//! Configuration is merged from several sources, lowest precedence first:
//! - Built-in defaults
//! - The workspace config file (`.policykb/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Per-base settings (embedding model, top_k, seed corpus) live next to each
//! base's index and are handled by the knowledge crate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Name of the workspace state directory.
pub const STATE_DIR: &str = ".policykb";

/// Default knowledge base name.
pub const DEFAULT_BASE: &str = "policies";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .policykb/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Knowledge base to operate on
    pub base: String,

    /// Embedding provider override (e.g., "trigram", "ollama")
    pub provider: Option<String>,

    /// Embedding model override
    pub model: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    embedding: Option<EmbeddingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
    base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingSection {
    provider: Option<String>,
    model: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            base: DEFAULT_BASE.to_string(),
            provider: None,
            model: None,
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment and defaults.
    ///
    /// Environment variables:
    /// - `POLICYKB_WORKSPACE`: Override workspace path
    /// - `POLICYKB_CONFIG`: Path to config file
    /// - `POLICYKB_PROVIDER`: Embedding provider
    /// - `POLICYKB_MODEL`: Embedding model
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration using an explicit workspace and/or config file.
    ///
    /// Explicit values (normally command-line flags) take precedence over
    /// `POLICYKB_WORKSPACE` / `POLICYKB_CONFIG`, and decide which YAML file
    /// is read. A config file named explicitly must exist; the default
    /// `.policykb/config.yaml` is optional.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace =
            workspace.or_else(|| std::env::var("POLICYKB_WORKSPACE").ok().map(PathBuf::from));
        let config_file =
            config_file.or_else(|| std::env::var("POLICYKB_CONFIG").ok().map(PathBuf::from));

        if let Some(workspace) = &workspace {
            config.workspace = workspace.clone();
        }
        config.config_file = config_file.clone();

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::Config(format!("Config file not found: {:?}", path)));
                }
                config = config.merge_yaml(&path)?;
            }
            None => {
                let default_path = config.state_dir().join("config.yaml");
                if default_path.exists() {
                    config = config.merge_yaml(&default_path)?;
                }
            }
        }

        // An explicit workspace outranks `workspace.path` from the file
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        if let Ok(provider) = std::env::var("POLICYKB_PROVIDER") {
            config.provider = Some(provider);
        }

        if let Ok(model) = std::env::var("POLICYKB_MODEL") {
            config.model = Some(model);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().apply_file(file))
    }

    fn apply_file(mut self, file: ConfigFile) -> Self {
        if let Some(ws) = file.workspace {
            if let Some(path) = ws.path {
                self.workspace = PathBuf::from(path);
            }
            if let Some(base) = ws.base {
                self.base = base;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(json) = logging.json {
                self.log_json = json;
            }
        }

        if let Some(embedding) = file.embedding {
            if embedding.provider.is_some() {
                self.provider = embedding.provider;
            }
            if embedding.model.is_some() {
                self.model = embedding.model;
            }
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over everything else.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if provider.is_some() {
            self.provider = provider;
        }

        if model.is_some() {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Log output format selected by the configuration.
    pub fn log_format(&self) -> LogFormat {
        if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    /// Get the path to the .policykb directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .policykb directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }
}
