//! Itemstore SQLite - ORM-style entity store
//!
//! SQLite-based `DataStore` for:
//! - Entity-scoped records with a JSON body
//! - Structured and raw SQL filters
//! - Offset paging with transactional mutations
//!
//! ## Architecture
//!
//! This crate implements the `DataStore` port from `itemstore-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Shared pool; applies and versions the schema
//! - [`SqliteStore`] - `DataStore` implementation for one entity
//! - [`DatabaseError`] - Error types for pool setup
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use itemstore_sqlite::{DatabasePool, EntityDefinition, SqliteStore};
//!
//! # async fn example() -> Result<(), itemstore_sqlite::DatabaseError> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/itemstore/items.db")).await?;
//! let store = SqliteStore::new(
//!     pool.pool().clone(),
//!     EntityDefinition::new("tasks").with_required_field("title"),
//! );
//! // Use store as DataStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod store;

pub use pool::{DatabasePool, PoolSettings, SCHEMA_VERSION};
pub use store::{EntityDefinition, SqliteStore};

/// Errors that can occur while opening or migrating the database
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
