//! Policy KB CLI
//!
//! Main entry point for the policykb command-line tool.
//! Answers questions from a local policy knowledge base by embedding
//! similarity.

mod commands;

use clap::{Parser, Subcommand};
use commands::{IngestCommand, SearchCommand, StatsCommand};
use policykb_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Policy KB - semantic search over policy documents
#[derive(Parser, Debug)]
#[command(name = "policykb")]
#[command(about = "Semantic search over policy documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "POLICYKB_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "POLICYKB_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Embedding provider (trigram, ollama)
    #[arg(short, long, global = true, env = "POLICYKB_PROVIDER")]
    provider: Option<String>,

    /// Embedding model identifier
    #[arg(short, long, global = true, env = "POLICYKB_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question from the knowledge base
    Search(SearchCommand),

    /// Add a document to the knowledge base
    Ingest(IngestCommand),

    /// Show knowledge base statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load configuration; --workspace and --config decide which file is read
    let mut config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?;
    if cli.log_json {
        config.log_json = true;
    }

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format())?;

    tracing::info!("policykb starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider override: {:?}", config.provider);
    tracing::debug!("Model override: {:?}", config.model);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Search(_) => "search",
        Commands::Ingest(_) => "ingest",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
