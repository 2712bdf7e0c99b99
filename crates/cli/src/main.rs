//! Wayfarer CLI
//!
//! Main entry point for the wayfarer command-line tool.
//! Answers Sri Lanka travel questions grounded in a local knowledge base.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, RefreshCommand, StatsCommand};
use std::path::PathBuf;
use wayfarer_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppResult,
};

/// Wayfarer - Sri Lanka travel assistant with retrieval-augmented answers
#[derive(Parser, Debug)]
#[command(name = "wayfarer")]
#[command(about = "Sri Lanka travel assistant with retrieval-augmented answers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "WAYFARER_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "WAYFARER_CONFIG")]
    config: Option<PathBuf>,

    /// Knowledge base name
    #[arg(short, long, global = true, env = "WAYFARER_BASE", default_value = "srilanka")]
    base: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true, env = "WAYFARER_LOG_FORMAT")]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, gemini, echo)
    #[arg(short, long, global = true, env = "WAYFARER_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "WAYFARER_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single travel question
    Ask(AskCommand),

    /// Interactive conversation with history
    Chat(ChatCommand),

    /// Reload data files and rebuild the index
    Refresh(RefreshCommand),

    /// Show knowledge base statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if let Some(format) = cli.log_format {
        config.log_format = Some(format);
    }

    let log_format = config
        .log_format
        .as_deref()
        .map(LogFormat::parse)
        .transpose()?
        .unwrap_or_default();
    logging::init_logging(config.log_level.as_deref(), config.no_color, log_format)?;

    tracing::info!("Wayfarer starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_wayfarer_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Refresh(_) => "refresh",
        Commands::Stats(_) => "stats",
    };
    let span = tracing::info_span!("command", name = command_name, base = %cli.base);
    let _guard = span.enter();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config, &cli.base).await,
        Commands::Chat(cmd) => cmd.execute(&config, &cli.base).await,
        Commands::Refresh(cmd) => cmd.execute(&config, &cli.base).await,
        Commands::Stats(cmd) => cmd.execute(&config, &cli.base),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
