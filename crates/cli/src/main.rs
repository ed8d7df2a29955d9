//! Ironloop CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Drive a goal through the agent loop with a scripted oracle
//! - `status`   — Show effective configuration and breaker defaults
//! - `learning` — Inspect the self-learning store

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod scripted;

#[derive(Parser)]
#[command(
    name = "ironloop",
    about = "Ironloop — resilient agent execution core",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config TOML file (defaults + env vars when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal through the agent loop
    Run {
        /// The goal to pursue
        #[arg(short, long)]
        goal: String,

        /// JSON file holding an array of canned oracle responses
        #[arg(short, long)]
        script: PathBuf,
    },

    /// Show effective configuration
    Status,

    /// Show the learning store contents
    Learning {
        /// Show full records instead of counts
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => ironloop_config::AppConfig::load(path)?,
        None => ironloop_config::AppConfig::from_env()?,
    };

    match cli.command {
        Commands::Run { goal, script } => commands::run::run(config, &goal, &script).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Learning { full } => commands::learning::run(config, full).await?,
    }

    Ok(())
}
