//! Config command - View and validate itemstore configuration
//!
//! Provides the `itemstore config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors
//! 3. Prints the configuration file location

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use itemstore_core::config::Config;

use crate::output::{get_formatter, OutputFormat};

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
            ConfigCommand::Path => execute_path(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        if !config_path.exists() {
            formatter.info("(file not found, showing defaults)");
        }
        formatter.info("");
        for line in config.to_yaml()?.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let message = if config_path.exists() {
                format!("Failed to parse configuration: {e:#}")
            } else {
                "Configuration file not found".to_string()
            };
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn execute_path(config_path: &Path, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        get_formatter(format).print_json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}
