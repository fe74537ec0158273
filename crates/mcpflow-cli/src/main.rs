//! # mcpflow-cli
//!
//! Command-line interface for mcpflow.

use std::io;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcpflow_core::config::LoggingConfig;
use mcpflow_core::error::format_error_with_suggestion;
use mcpflow_core::{Config, ReasoningEffort, Verbosity};

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
}

/// mcpflow - stream model answers that call tools on MCP servers
#[derive(Parser)]
#[command(name = "mcpflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one chat turn and stream the answer
    Chat(ChatArgs),
    /// List the merged tool catalog of some servers
    Tools {
        /// Tool server URL (repeatable); configured servers are always included
        #[arg(short, long = "server", value_name = "URL")]
        servers: Vec<String>,
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(clap::Args)]
pub struct ChatArgs {
    /// The user message
    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    /// Tool server URL (repeatable); configured servers are always included
    #[arg(short, long = "server", value_name = "URL")]
    pub servers: Vec<String>,

    /// System instructions
    #[arg(long)]
    pub system: Option<String>,

    /// Reasoning effort (none, minimal, low, medium, high)
    #[arg(long)]
    pub effort: Option<ReasoningEffort>,

    /// Answer verbosity (low, medium, high)
    #[arg(long)]
    pub verbosity: Option<Verbosity>,

    /// Hide reasoning summaries
    #[arg(long)]
    pub no_thinking: bool,

    /// Write chunks as `data: <json>` event-stream frames
    #[arg(long)]
    pub sse: bool,

    /// Session id echoed in the final chunk
    #[arg(long, value_name = "SESSION_ID")]
    pub session_id: Option<String>,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Validate the configuration
    Validate,
    /// Print the configuration directory
    Path,
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    // stdout carries the chunk stream, so logs go to stderr.
    if logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = Config::load();
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };

    init_logging(cli.verbose, &config.logging);
    if let Err(e) = loaded {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    let ctx = AppContext { config };

    if let Err(e) = run(cli.command, &ctx).await {
        match e.downcast_ref::<mcpflow_core::Error>() {
            Some(err) => eprintln!("Error: {}", format_error_with_suggestion(err)),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, ctx: &AppContext) -> anyhow::Result<()> {
    match command {
        Commands::Chat(args) => {
            commands::chat::run(args, ctx).await?;
        }
        Commands::Tools { servers, json } => {
            commands::tools::run(&servers, json, ctx).await?;
        }
        Commands::Config { action } => {
            commands::config::handle(action, ctx)?;
        }
        Commands::Version => {
            println!("mcpflow {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}
