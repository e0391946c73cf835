//! Key-value data store
//!
//! Each key holds one record. Keys are the record identifiers, so inserts
//! must carry one. Fetches list records in key order unless sort
//! descriptors say otherwise.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{BatchCursor, FetchOptions, PagingScheme, Record, RecordId, StoreError};
use crate::ports::{validate_fetch, DataStore, FetchedBatch};

use super::page_in_memory;

/// In-memory key-value store
#[derive(Debug, Clone, Default)]
pub struct KeyValueStore {
    entries: Arc<DashMap<RecordId, Map<String, Value>>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `(key, fields)` pairs
    pub fn with_entries(entries: impl IntoIterator<Item = (RecordId, Map<String, Value>)>) -> Self {
        let store = Self::new();
        for (key, fields) in entries {
            store.entries.insert(key, fields);
        }
        store
    }

    pub fn get(&self, key: &RecordId) -> Option<Record> {
        self.entries
            .get(key)
            .map(|entry| Record::from_fields(entry.value().clone()).with_id(key.clone()))
    }

    /// Sets a key unconditionally, bypassing insert/update checks
    pub fn set(&self, key: RecordId, fields: Map<String, Value>) {
        self.entries.insert(key, fields);
    }

    /// Keys in ascending order
    pub fn keys(&self) -> Vec<RecordId> {
        let mut keys: Vec<RecordId> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn records_in_key_order(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .entries
            .iter()
            .map(|e| Record::from_fields(e.value().clone()).with_id(e.key().clone()))
            .collect();
        records.sort_by(|a, b| a.id().cmp(&b.id()));
        records
    }
}

fn require_key(record: &Record) -> Result<&RecordId, StoreError> {
    record.id().ok_or_else(|| {
        StoreError::ValidationRejected("key-value records need a key".to_string())
    })
}

#[async_trait::async_trait]
impl DataStore for KeyValueStore {
    fn paging_scheme(&self) -> PagingScheme {
        PagingScheme::Offset
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
    ) -> Result<FetchedBatch, StoreError> {
        validate_fetch(options, cursor, PagingScheme::Offset)?;
        if !cursor.has_more() {
            return Ok(FetchedBatch::exhausted());
        }
        page_in_memory(self.records_in_key_order(), options, cursor)
    }

    async fn insert(&self, record: &Record) -> Result<Record, StoreError> {
        let key = require_key(record)?.clone();
        match self.entries.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::ValidationRejected(
                format!("key {key} already exists"),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.fields().clone());
                debug!(key = %key, "Inserted key");
                Ok(record.clone())
            }
        }
    }

    async fn update(&self, record: &Record) -> Result<Record, StoreError> {
        let key = require_key(record)?;
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                *entry = record.fields().clone();
                debug!(key = %key, "Updated key");
                Ok(record.clone())
            }
            None => Err(StoreError::NotFound(format!("key {key}"))),
        }
    }

    async fn delete(&self, record: &Record) -> Result<(), StoreError> {
        let key = require_key(record)?;
        match self.entries.remove(key) {
            Some(_) => {
                debug!(key = %key, "Deleted key");
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("key {key}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SortDescriptor;
    use serde_json::json;

    fn key(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn store() -> KeyValueStore {
        KeyValueStore::with_entries([
            (key("charlie"), fields(json!({"rank": 1}))),
            (key("alpha"), fields(json!({"rank": 3}))),
            (key("bravo"), fields(json!({"rank": 2}))),
        ])
    }

    fn ids(batch: &FetchedBatch) -> Vec<String> {
        batch.records.iter().map(|r| r.id().unwrap().to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_in_key_order() {
        let store = store();
        let options = FetchOptions::new().with_page_size(2);
        let first = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
        assert_eq!(ids(&first), vec!["alpha", "bravo"]);
        let second = store.fetch(&options, &first.cursor).await.unwrap();
        assert_eq!(ids(&second), vec!["charlie"]);
        assert!(!second.cursor.has_more());
    }

    #[tokio::test]
    async fn test_sort_overrides_key_order() {
        let store = store();
        let options = FetchOptions::new().with_sort(SortDescriptor::ascending("rank"));
        let batch = store.fetch(&options, &BatchCursor::start(&options)).await.unwrap();
        assert_eq!(ids(&batch), vec!["charlie", "bravo", "alpha"]);
    }

    #[tokio::test]
    async fn test_insert_requires_new_key() {
        let store = store();
        let missing_key = store.insert(&Record::new().with_field("rank", 4)).await;
        assert!(matches!(missing_key, Err(StoreError::ValidationRejected(_))));

        let existing = store.insert(&Record::new().with_id(key("alpha"))).await;
        assert!(matches!(existing, Err(StoreError::ValidationRejected(_))));

        store
            .insert(&Record::new().with_id(key("delta")).with_field("rank", 4))
            .await
            .unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.get(&key("delta")).unwrap().get("rank"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_key() {
        let store = store();
        let ghost = Record::new().with_id(key("ghost"));
        assert!(matches!(store.update(&ghost).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&ghost).await, Err(StoreError::NotFound(_))));

        store
            .update(&Record::new().with_id(key("alpha")).with_field("rank", 9))
            .await
            .unwrap();
        assert_eq!(store.get(&key("alpha")).unwrap().get("rank"), Some(&json!(9)));

        store.delete(&Record::new().with_id(key("alpha"))).await.unwrap();
        assert_eq!(store.keys(), vec![key("bravo"), key("charlie")]);
    }
}
