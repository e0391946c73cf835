//! Domain types and query logic
//!
//! This module contains the core domain types for itemstore:
//! - Newtypes for validated record identifiers
//! - The opaque `Record` value handled by every store
//! - Fetch configuration (`FetchOptions`) and paging progress (`BatchCursor`)
//! - In-memory filter and sort evaluation
//! - Per-operation no-connection policies
//! - Domain-specific error types

pub mod cursor;
pub mod errors;
pub mod fetch_options;
pub mod newtypes;
pub mod policy;
pub mod query;
pub mod record;

// Re-export commonly used types
pub use cursor::{BatchCursor, CursorPosition};
pub use errors::{DomainError, FetchError, StoreError};
pub use fetch_options::{
    Condition, ConditionOp, FetchOptions, Filter, PageSize, PagingScheme, SortDescriptor,
};
pub use newtypes::RecordId;
pub use policy::{ConnectionPolicies, NoConnectionPolicy, OperationKind};
pub use query::{compare_records, compare_values, sort_records};
pub use record::Record;
