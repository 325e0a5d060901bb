//! SQLite storage backing the source index.
//!
//! File-backed databases run in WAL mode so `index resolve` can read while a
//! sync run folds new tables in. The schema lives in `migrations/` and is
//! applied on every open.
//!
//! ```no_run
//! use pubsync_core::{Database, SourceIndex};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = SourceIndex::new(Database::open(Path::new("source_index.db")).await?);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// One writer at a time; the remaining connections serve lookups.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to or configure the database.
    #[error("index database error: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to apply the index schema.
    #[error("failed to migrate index schema: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Migrated connection pool for the index.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the index file at `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the file cannot be opened,
    /// or `DbError::Migration` if the schema cannot be applied.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        Self::connect(options, MAX_CONNECTIONS).await
    }

    /// Opens a private in-memory index.
    ///
    /// The pool holds a single connection; the database lives as long as it.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open`].
    #[instrument]
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options, 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(max_connections, "index database ready");
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every pooled connection.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
