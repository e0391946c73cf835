//! Data store port (driven/secondary port)
//!
//! This module defines the uniform CRUD + fetch contract every backend
//! adapter implements: in-memory arrays, key-value maps, the SQLite-backed
//! entity store and remote REST services.
//!
//! ## Design Notes
//!
//! - Uses the typed [`StoreError`] rather than `anyhow::Result`: the
//!   controller branches on the error kind (retry later vs. fail).
//! - Uses `#[async_trait]` for async trait methods. In-memory stores
//!   complete immediately; remote stores suspend on the network.
//! - A store holds only its backend connection and definition. Paging
//!   progress lives in the caller-owned [`BatchCursor`], so one store can
//!   serve several controllers with different options.

use crate::domain::{BatchCursor, FetchError, FetchOptions, PagingScheme, Record, StoreError};

/// One batch of records plus the cursor to resume from
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBatch {
    pub records: Vec<Record>,
    pub cursor: BatchCursor,
}

impl FetchedBatch {
    pub fn new(records: Vec<Record>, cursor: BatchCursor) -> Self {
        Self { records, cursor }
    }

    /// Empty batch past the end of the results
    pub fn exhausted() -> Self {
        Self::new(Vec::new(), BatchCursor::exhausted())
    }
}

/// Port trait for a backend holding records
///
/// ## Contract
///
/// - `fetch` returns at most `options.page_size` records and reports
///   `has_more = false` once the backend signals the end of results. With
///   an unpaged page size it returns the whole result set and
///   `has_more = false`.
/// - `fetch` does not mutate caller-owned state; the next cursor is part
///   of the returned batch.
/// - `insert` returns the canonical persisted record, which may carry a
///   backend-assigned identifier.
/// - Unreachable backends report `StoreError::ConnectionUnavailable`.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    /// Paging scheme this store resumes fetches with
    fn paging_scheme(&self) -> PagingScheme;

    /// Fetches the batch at `cursor`
    async fn fetch(
        &self,
        options: &FetchOptions,
        cursor: &BatchCursor,
    ) -> Result<FetchedBatch, FetchError>;

    /// Persists a new record
    async fn insert(&self, record: &Record) -> Result<Record, StoreError>;

    /// Persists changes to an existing record
    async fn update(&self, record: &Record) -> Result<Record, StoreError>;

    /// Removes a record
    async fn delete(&self, record: &Record) -> Result<(), StoreError>;
}

/// Check options and cursor against a store's paging scheme before any
/// backend work
pub fn validate_fetch(
    options: &FetchOptions,
    cursor: &BatchCursor,
    scheme: PagingScheme,
) -> Result<(), StoreError> {
    options.validate(scheme)?;
    cursor.check_scheme(scheme)
}
