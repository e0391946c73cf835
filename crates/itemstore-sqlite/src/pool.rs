//! Opening the record database
//!
//! A [`DatabasePool`] owns the sqlx pool every [`SqliteStore`] of one file
//! shares. Opening applies the `records` schema and stamps its version into
//! `PRAGMA user_version`; a file written by a newer schema is refused rather
//! than read with the wrong layout.
//!
//! [`SqliteStore`]: crate::SqliteStore

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::DatabaseError;

/// Layout version of the `records` table
pub const SCHEMA_VERSION: i64 = 1;

const INITIAL_SCHEMA: &str = include_str!("migrations/20260301_initial.sql");

/// Connection limits for a file-backed database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long a writer waits on a locked database before SQLITE_BUSY
    pub busy_timeout: Duration,
    /// How long a store call waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared SQLite pool for entity stores
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the database at `db_path` with default settings
    pub async fn new(db_path: &Path) -> Result<Self, DatabaseError> {
        Self::open(db_path, PoolSettings::default()).await
    }

    /// Opens (or creates) the database at `db_path`
    ///
    /// Missing parent directories are created. The file runs in WAL mode so
    /// fetches do not block on a concurrent mutation.
    ///
    /// # Errors
    ///
    /// `ConnectionFailed` when the directory or file cannot be opened,
    /// `MigrationFailed` when the schema cannot be applied or the file
    /// carries a newer schema version.
    pub async fn open(db_path: &Path, settings: PoolSettings) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionFailed(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(settings.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        let pool = Self { pool };
        pool.migrate().await?;
        info!(
            path = %db_path.display(),
            max_connections = settings.max_connections,
            "Record database opened"
        );
        Ok(pool)
    }

    /// Private in-memory database on a single connection
    ///
    /// Every SQLite connection gets its own `:memory:` database, so the pool
    /// never opens a second one.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("in-memory database: {e}")))?;

        let pool = Self { pool };
        pool.migrate().await?;
        debug!("In-memory record database ready");
        Ok(pool)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version stamped in the file
    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(format!("cannot read schema version: {e}")))?;
        Ok(version)
    }

    /// Closes every connection; later store operations report the backend
    /// as unavailable
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), DatabaseError> {
        let found = self.schema_version().await?;
        if found > SCHEMA_VERSION {
            return Err(DatabaseError::MigrationFailed(format!(
                "database schema version {found} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        if found == SCHEMA_VERSION {
            debug!(version = found, "Record schema up to date");
            return Ok(());
        }

        sqlx::raw_sql(INITIAL_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed(format!("records schema: {e}")))?;
        // PRAGMA does not take bound parameters
        sqlx::raw_sql(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed(format!("schema version stamp: {e}")))?;
        info!(from = found, to = SCHEMA_VERSION, "Record schema migrated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_has_schema() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(pool.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_file_pool_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("items.db");
        let pool = DatabasePool::new(&path).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_reopening_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.db");
        DatabasePool::new(&path).await.unwrap().close().await;

        let settings = PoolSettings {
            max_connections: 2,
            ..PoolSettings::default()
        };
        let reopened = DatabasePool::open(&path, settings).await.unwrap();
        assert_eq!(reopened.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.db");
        let pool = DatabasePool::new(&path).await.unwrap();
        sqlx::raw_sql("PRAGMA user_version = 99")
            .execute(pool.pool())
            .await
            .unwrap();
        pool.close().await;

        let err = DatabasePool::new(&path).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MigrationFailed(ref m) if m.contains("99")));
    }
}
