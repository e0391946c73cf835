//! itemstore CLI - Command-line interface for itemstore
//!
//! Provides commands for:
//! - Browsing the configured store page by page
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod backend;
mod commands;
mod output;

use commands::{browse::BrowseCommand, config::ConfigCommand};
use itemstore_core::config::Config;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "itemstore", version, about = "Paged record lists over pluggable stores")]
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
    /// Load pages from the configured store and print them
    Browse(BrowseCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // RUST_LOG wins, then -v, then logging.level from the config file
    let level = match cli.verbose {
        0 => Config::load_or_default(&config_path).logging.level,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let explicit_config = cli.config.is_some();

    match cli.command {
        Commands::Browse(cmd) => cmd.execute(&config_path, explicit_config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
