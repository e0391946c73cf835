//! Browse command - Page through the configured store
//!
//! Provides the `itemstore browse` CLI command which:
//! 1. Builds the store named in the `backend` section
//! 2. Drives an `ItemsController` for the requested number of pages
//! 3. Prints each page and the notifications the controller emitted

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use serde_json::{json, Value};
use tracing::{debug, info};

use itemstore_core::domain::{PageSize, Record, RecordId, StoreError};
use itemstore_core::ports::{ChangeEvent, EventLog};
use itemstore_core::usecases::{ItemsController, PageOutcome};

use crate::backend::build_store;
use crate::commands::load_config;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct BrowseCommand {
    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pages: usize,

    /// Keep loading until the store reports no more records
    #[arg(long, conflicts_with = "pages")]
    all: bool,

    /// Override fetch.page_size (0 loads everything in one batch)
    #[arg(long)]
    page_size: Option<usize>,
}

/// One successfully loaded page
#[derive(Debug, Clone, PartialEq)]
struct PageReport {
    number: usize,
    range: Range<usize>,
    has_more: bool,
}

impl BrowseCommand {
    /// Execute the browse command
    pub async fn execute(
        &self,
        config_path: &Path,
        explicit_config: bool,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let config = load_config(config_path, explicit_config)?;

        let errors = config.validate();
        if !errors.is_empty() {
            let summary: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!("Invalid configuration: {}", summary.join("; "));
        }

        let mut options = config.fetch.to_fetch_options();
        if let Some(size) = self.page_size {
            options.page_size = PageSize::new(size);
        }

        let store = build_store(&config.backend, options.order_attribute.as_deref()).await?;
        let log = Arc::new(EventLog::new());
        let controller = ItemsController::new(store, options, log.clone())
            .with_connection_policies(config.connection);

        info!(backend = config.backend.kind(), "Browsing store");
        let (pages, failure) = self.load_pages(&controller).await;
        let items = controller.items();
        let events = log.events();

        if format.is_json() {
            let pages_json: Vec<Value> = pages
                .iter()
                .map(|page| {
                    json!({
                        "page": page.number,
                        "range": [page.range.start, page.range.end],
                        "has_more": page.has_more,
                        "records": items[page.range.clone()].iter().map(record_json).collect::<Vec<_>>(),
                    })
                })
                .collect();
            let events_json: Vec<Value> = events
                .iter()
                .map(|event| json!({ "kind": event.kind(), "detail": describe_event(event) }))
                .collect();
            formatter.print_json(&json!({
                "backend": config.backend.kind(),
                "pages": pages_json,
                "total": items.len(),
                "has_more": controller.has_more(),
                "error": failure.as_ref().map(ToString::to_string),
                "events": events_json,
            }));
        } else {
            formatter.success(&format!(
                "Loaded {} page{} ({} records) from {} store",
                pages.len(),
                if pages.len() == 1 { "" } else { "s" },
                items.len(),
                config.backend.kind()
            ));
            for page in &pages {
                formatter.info("");
                formatter.info(&format!(
                    "Page {}: records {}..{}",
                    page.number, page.range.start, page.range.end
                ));
                for record in &items[page.range.clone()] {
                    formatter.info(&format!("  {}", describe_record(record)));
                }
            }
            formatter.info("");
            formatter.info(&format!(
                "More records available: {}",
                if controller.has_more() { "yes" } else { "no" }
            ));
            formatter.info("Notifications:");
            for event in &events {
                formatter.info(&format!("  {}", describe_event(event)));
            }
        }

        match failure {
            Some(error) => Err(anyhow::Error::new(error).context("Failed to load page")),
            None => Ok(()),
        }
    }

    /// Requests pages until the limit, the end of the data or an error
    async fn load_pages(
        &self,
        controller: &ItemsController,
    ) -> (Vec<PageReport>, Option<StoreError>) {
        let mut pages = Vec::new();
        while self.all || pages.len() < self.pages {
            match controller.request_next_page().await {
                Ok(PageOutcome::Appended { range, has_more }) => {
                    pages.push(PageReport {
                        number: pages.len() + 1,
                        range,
                        has_more,
                    });
                    if !has_more {
                        break;
                    }
                }
                Ok(outcome) => {
                    debug!(?outcome, "Stopped loading pages");
                    break;
                }
                Err(error) => return (pages, Some(error)),
            }
        }
        (pages, None)
    }
}

fn record_json(record: &Record) -> Value {
    json!({
        "id": record.id().map(RecordId::as_str),
        "fields": record.fields(),
    })
}

fn describe_record(record: &Record) -> String {
    let id = record.id().map(RecordId::as_str).unwrap_or("-");
    format!("[{id}] {}", Value::Object(record.fields().clone()))
}

fn describe_event(event: &ChangeEvent) -> String {
    let id_or_dash = |id: &Option<RecordId>| {
        id.as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    match event {
        ChangeEvent::FullReload => event.kind().to_string(),
        ChangeEvent::ItemsAppended { range } => {
            format!("{} {}..{}", event.kind(), range.start, range.end)
        }
        ChangeEvent::ItemInserted { index }
        | ChangeEvent::ItemUpdated { index }
        | ChangeEvent::ItemRemoved { index } => format!("{} at {index}", event.kind()),
        ChangeEvent::FetchFailed { error } => {
            format!("{} ({}): {error}", event.kind(), error.kind())
        }
        ChangeEvent::LoadingStateChanged { loading } => {
            format!("{} loading={loading}", event.kind())
        }
        ChangeEvent::InsertFailed { record_id, error }
        | ChangeEvent::UpdateFailed { record_id, error }
        | ChangeEvent::DeleteFailed { record_id, error } => {
            format!("{} {}: {error}", event.kind(), id_or_dash(record_id))
        }
        ChangeEvent::OperationDeferred { kind, record_id } => {
            format!("{} {kind} {}", event.kind(), id_or_dash(record_id))
        }
    }
}
