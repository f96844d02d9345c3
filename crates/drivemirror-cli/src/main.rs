//! DriveMirror CLI - mirror a folder between two OneDrive accounts
//!
//! Provides commands for:
//! - Authorizing the source and destination accounts
//! - Running a one-way sync from source to destination
//! - Viewing and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use drivemirror_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod token_store;

use commands::{auth::AuthCommand, config::ConfigCommand, sync::SyncCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "drivemirror",
    version,
    about = "Mirror a folder from one OneDrive account to another"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authorize the source or destination account
    Auth(AuthCommand),
    /// Copy new and changed files from source to destination
    Sync(SyncCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Setup tracing: RUST_LOG wins, then -v, then logging.level
    let filter = match cli.verbose {
        0 => Config::load_or_default(&config_path).logging.level,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&config_path, format).await,
        Commands::Sync(cmd) => cmd.execute(&config_path, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
