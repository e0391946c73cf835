//! Array-backed data store
//!
//! Wraps a `Vec<Record>` owned by the integrator. Several stores (and so
//! several controllers) can share one array through [`ArrayStore::shared`].
//! Every operation completes without suspending.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::domain::{BatchCursor, FetchOptions, PagingScheme, Record, RecordId, StoreError};
use crate::ports::{validate_fetch, DataStore, FetchedBatch};

use super::page_in_memory;

/// In-memory store over an ordered array of records
#[derive(Debug, Clone, Default)]
pub struct ArrayStore {
    records: Arc<RwLock<Vec<Record>>>,
}

impl ArrayStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Use an array owned elsewhere
    pub fn from_shared(records: Arc<RwLock<Vec<Record>>>) -> Self {
        Self { records }
    }

    /// Handle to the underlying array
    pub fn shared(&self) -> Arc<RwLock<Vec<Record>>> {
        Arc::clone(&self.records)
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.read()?.clone())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Record>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unexpected("array store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Record>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unexpected("array store lock poisoned".to_string()))
    }
}

fn require_id(record: &Record) -> Result<&RecordId, StoreError> {
    record
        .id()
        .ok_or_else(|| StoreError::ValidationRejected("record has no identifier".to_string()))
}

fn position_of(records: &[Record], id: &RecordId) -> Option<usize> {
    records.iter().position(|r| r.id() == Some(id))
}

#[async_trait::async_trait]
impl DataStore for ArrayStore {
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
        let records = self.snapshot()?;
        page_in_memory(records, options, cursor)
    }

    async fn insert(&self, record: &Record) -> Result<Record, StoreError> {
        let mut saved = record.clone();
        let id = match record.id() {
            Some(id) => id.clone(),
            None => RecordId::generate(),
        };
        saved.set_id(id.clone());

        let mut records = self.write()?;
        if position_of(&records, &id).is_some() {
            return Err(StoreError::ValidationRejected(format!(
                "record {id} already exists"
            )));
        }
        records.push(saved.clone());
        debug!(id = %id, len = records.len(), "Inserted record into array store");
        Ok(saved)
    }

    async fn update(&self, record: &Record) -> Result<Record, StoreError> {
        let id = require_id(record)?;
        let mut records = self.write()?;
        let index = position_of(&records, id)
            .ok_or_else(|| StoreError::NotFound(format!("record {id}")))?;
        records[index] = record.clone();
        debug!(id = %id, index, "Updated record in array store");
        Ok(record.clone())
    }

    async fn delete(&self, record: &Record) -> Result<(), StoreError> {
        let id = require_id(record)?;
        let mut records = self.write()?;
        let index = position_of(&records, id)
            .ok_or_else(|| StoreError::NotFound(format!("record {id}")))?;
        records.remove(index);
        debug!(id = %id, index, "Deleted record from array store");
        Ok(())
    }
}
