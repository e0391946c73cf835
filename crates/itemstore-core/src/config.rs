//! Configuration module for itemstore.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionPolicies, FetchOptions, NoConnectionPolicy, SortDescriptor};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for itemstore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub connection: ConnectionPolicies,
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
}

/// How lists are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Records per batch; `0` fetches everything in one call.
    pub page_size: usize,
    /// Row offset of the first batch (offset-paged stores only).
    pub initial_offset: usize,
    /// Field the list is kept sorted by.
    pub order_attribute: Option<String>,
    /// Additional sort descriptors, applied before the order attribute.
    pub sort: Vec<SortDescriptor>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

/// Which store backs the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory array seeded with JSON objects.
    Memory {
        #[serde(default)]
        records: Vec<serde_json::Value>,
        /// Key of the identifier inside each seeded object.
        #[serde(default = "default_id_key")]
        id_key: String,
    },
    /// In-memory key-value map.
    KeyValue {
        #[serde(default)]
        entries: BTreeMap<String, serde_json::Value>,
    },
    /// Entity table in a SQLite database.
    Sqlite {
        path: PathBuf,
        entity: String,
        #[serde(default)]
        required_fields: Vec<String>,
    },
    /// REST web service; the body is a web service definition.
    Web { service: serde_json::Value },
}

fn default_id_key() -> String {
    "id".to_string()
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/itemstore/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("itemstore")
            .join("config.yaml")
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            initial_offset: 0,
            order_attribute: None,
            sort: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory {
            records: Vec::new(),
            id_key: default_id_key(),
        }
    }
}

impl FetchConfig {
    /// Fetch options described by this section.
    pub fn to_fetch_options(&self) -> FetchOptions {
        let mut options = FetchOptions::new()
            .with_page_size(self.page_size)
            .with_initial_offset(self.initial_offset);
        options.sort = self.sort.clone();
        options.order_attribute = self.order_attribute.clone();
        options
    }
}

impl BackendConfig {
    /// Short name of the backend kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory { .. } => "memory",
            BackendConfig::KeyValue { .. } => "key_value",
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Web { .. } => "web",
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"fetch.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `fetch.page_size`.
const MAX_PAGE_SIZE: usize = 10_000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- fetch ---
        if self.fetch.page_size > MAX_PAGE_SIZE {
            push(
                "fetch.page_size",
                format!("must not exceed {MAX_PAGE_SIZE} (use 0 for unpaged)"),
            );
        }
        if let Some(attr) = &self.fetch.order_attribute {
            if attr.trim().is_empty() {
                push("fetch.order_attribute", "must not be empty".into());
            }
        }
        for (i, descriptor) in self.fetch.sort.iter().enumerate() {
            if descriptor.field.trim().is_empty() {
                push(&format!("fetch.sort[{i}].field"), "must not be empty".into());
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        // --- backend ---
        match &self.backend {
            BackendConfig::Memory { records, id_key } => {
                if id_key.trim().is_empty() {
                    push("backend.id_key", "must not be empty".into());
                }
                if let Some(i) = records.iter().position(|r| !r.is_object()) {
                    push(
                        &format!("backend.records[{i}]"),
                        "must be a mapping".into(),
                    );
                }
            }
            BackendConfig::KeyValue { entries } => {
                if entries.keys().any(|k| k.trim().is_empty()) {
                    push("backend.entries", "keys must not be empty".into());
                }
            }
            BackendConfig::Sqlite { path, entity, .. } => {
                if path.as_os_str().is_empty() {
                    push("backend.path", "must not be empty".into());
                }
                if entity.trim().is_empty() {
                    push("backend.entity", "must not be empty".into());
                }
            }
            BackendConfig::Web { service } => {
                let base_url = service.get("base_url").and_then(|v| v.as_str());
                match base_url {
                    Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                    Some(url) => push(
                        "backend.service.base_url",
                        format!("must be an http(s) URL, got '{url}'"),
                    ),
                    None => push("backend.service.base_url", "is required".into()),
                }
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use itemstore_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .fetch_page_size(50)
///     .fetch_order_attribute("position")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- fetch ---

    pub fn fetch_page_size(mut self, size: usize) -> Self {
        self.config.fetch.page_size = size;
        self
    }

    pub fn fetch_initial_offset(mut self, offset: usize) -> Self {
        self.config.fetch.initial_offset = offset;
        self
    }

    pub fn fetch_order_attribute(mut self, field: impl Into<String>) -> Self {
        self.config.fetch.order_attribute = Some(field.into());
        self
    }

    pub fn fetch_sort(mut self, descriptor: SortDescriptor) -> Self {
        self.config.fetch.sort.push(descriptor);
        self
    }

    // --- connection ---

    pub fn connection_insert(mut self, policy: NoConnectionPolicy) -> Self {
        self.config.connection.insert = policy;
        self
    }

    pub fn connection_update(mut self, policy: NoConnectionPolicy) -> Self {
        self.config.connection.update = policy;
        self
    }

    pub fn connection_delete(mut self, policy: NoConnectionPolicy) -> Self {
        self.config.connection.delete = policy;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- backend ---

    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
