//! Builds the configured store behind the `DataStore` port

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use itemstore_core::config::BackendConfig;
use itemstore_core::domain::{Record, RecordId};
use itemstore_core::ports::DataStore;
use itemstore_core::stores::{ArrayStore, KeyValueStore};
use itemstore_sqlite::{DatabasePool, EntityDefinition, SqliteStore};
use itemstore_web::WebServiceStore;

/// Instantiates the store described by `config`
///
/// `order_attribute` becomes the SQLite entity's default ordering.
pub async fn build_store(
    config: &BackendConfig,
    order_attribute: Option<&str>,
) -> Result<Arc<dyn DataStore>> {
    let store: Arc<dyn DataStore> = match config {
        BackendConfig::Memory { records, id_key } => {
            let records = records
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    Record::from_json_object(value.clone(), id_key)
                        .with_context(|| format!("backend.records[{i}] is not a record"))
                })
                .collect::<Result<Vec<_>>>()?;
            info!(records = records.len(), "Using in-memory array store");
            Arc::new(ArrayStore::new(records))
        }
        BackendConfig::KeyValue { entries } => {
            let mut seeded = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let id = RecordId::new(key.clone())
                    .with_context(|| format!("invalid key '{key}' in backend.entries"))?;
                let Value::Object(fields) = value else {
                    bail!("backend.entries.{key} must be an object");
                };
                seeded.push((id, fields.clone()));
            }
            info!(entries = seeded.len(), "Using in-memory key-value store");
            Arc::new(KeyValueStore::with_entries(seeded))
        }
        BackendConfig::Sqlite {
            path,
            entity,
            required_fields,
        } => {
            let pool = DatabasePool::new(path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            let mut definition = EntityDefinition::new(entity.clone());
            definition.required_fields = required_fields.clone();
            if let Some(attr) = order_attribute {
                definition = definition.with_order_attribute(attr);
            }
            info!(path = %path.display(), entity = %entity, "Using SQLite store");
            Arc::new(SqliteStore::new(pool.pool().clone(), definition))
        }
        BackendConfig::Web { service } => {
            let store = WebServiceStore::from_value(service.clone())
                .context("Invalid web service definition")?;
            info!(
                base_url = %store.definition().base_url,
                scheme = %store.paging_scheme(),
                "Using web service store"
            );
            Arc::new(store)
        }
    };
    Ok(store)
}
