//! CLI subcommands

pub mod browse;
pub mod config;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use itemstore_core::config::Config;

/// Loads the configuration a command runs with
///
/// An explicitly requested file must exist; the default location falls back
/// to built-in defaults when absent.
pub fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if path.exists() || explicit {
        return Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }
    debug!(path = %path.display(), "No configuration file, using defaults");
    Ok(Config::default())
}
