//! In-memory data stores
//!
//! - [`ArrayStore`] - an owned, shared `Vec<Record>`
//! - [`KeyValueStore`] - one record per key, ordered by key
//!
//! Both page by offset and evaluate structured filters and sort descriptors
//! in memory through [`crate::domain::query`].

pub mod array;
pub mod key_value;

pub use array::ArrayStore;
pub use key_value::KeyValueStore;

use tracing::debug;

use crate::domain::{sort_records, BatchCursor, FetchOptions, Record, StoreError};
use crate::ports::FetchedBatch;

/// Filter, sort and slice an in-memory result set
///
/// `records` arrive in the store's natural order; the sort is stable, so
/// ties keep that order.
pub(crate) fn page_in_memory(
    mut records: Vec<Record>,
    options: &FetchOptions,
    cursor: &BatchCursor,
) -> Result<FetchedBatch, StoreError> {
    if let Some(filter) = &options.filter {
        filter.ensure_structured()?;
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if filter.matches(&record)? {
                kept.push(record);
            }
        }
        records = kept;
    }
    sort_records(&mut records, &options.effective_sort());

    let offset = cursor.resolve_offset(options)?;
    let total = records.len();
    let page: Vec<Record> = match options.page_size.limit() {
        Some(limit) => records.into_iter().skip(offset).take(limit).collect(),
        None => records.into_iter().skip(offset).collect(),
    };
    let next_offset = offset + page.len();
    let has_more = !options.page_size.is_unpaged() && next_offset < total;

    debug!(
        offset,
        returned = page.len(),
        total,
        has_more,
        "Served in-memory batch"
    );
    Ok(FetchedBatch::new(page, BatchCursor::offset(next_offset, has_more)))
}
