//! SQLite persistence for the source index.

use std::path::Path;

use sqlx::{FromRow, Row};
use tracing::{debug, info, instrument};

use super::entry::{IndexEntry, Partition, Resolution, resolve};
use super::error::{IndexError, Result};
use crate::db::Database;
use crate::transform::parse_normalized_date;

#[derive(Debug, FromRow)]
struct IndexRow {
    record_id: String,
    publication_date: Option<String>,
    partition: String,
    source_file: String,
}

impl TryFrom<IndexRow> for IndexEntry {
    type Error = IndexError;

    fn try_from(row: IndexRow) -> Result<Self> {
        let partition = row
            .partition
            .parse::<Partition>()
            .map_err(|detail| IndexError::Corrupt {
                record_id: row.record_id.clone(),
                detail,
            })?;
        Ok(Self {
            publication_date: row.publication_date.as_deref().and_then(parse_normalized_date),
            record_id: row.record_id,
            partition,
            source_file: row.source_file,
        })
    }
}

/// Durable reverse index from record id to archive file(s).
#[derive(Debug, Clone)]
pub struct SourceIndex {
    db: Database,
}

impl SourceIndex {
    /// Creates an index over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens (creating if needed) the index file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Open`] if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Inserts entries, updating date and partition of pairs already present.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Database`] if a statement fails; the batch is
    /// rolled back.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn insert_entries(&self, entries: &[IndexEntry]) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;
        let mut written = 0;
        for entry in entries {
            let result = sqlx::query(
                r"INSERT INTO source_index (record_id, publication_date, partition, source_file)
                  VALUES (?, ?, ?, ?)
                  ON CONFLICT (record_id, source_file) DO UPDATE SET
                      publication_date = excluded.publication_date,
                      partition = excluded.partition",
            )
            .bind(&entry.record_id)
            .bind(entry.publication_date.map(|date| date.format("%Y-%m-%d").to_string()))
            .bind(entry.partition.as_str())
            .bind(&entry.source_file)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        debug!(written, "index entries stored");
        Ok(written)
    }

    /// Replaces the whole index with `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Database`] if a statement fails; the previous
    /// contents are kept in that case.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn rebuild(&self, entries: &[IndexEntry]) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM source_index")
            .execute(&mut *tx)
            .await?;
        let mut written = 0;
        for entry in entries {
            let result = sqlx::query(
                r"INSERT OR IGNORE INTO source_index (record_id, publication_date, partition, source_file)
                  VALUES (?, ?, ?, ?)",
            )
            .bind(&entry.record_id)
            .bind(entry.publication_date.map(|date| date.format("%Y-%m-%d").to_string()))
            .bind(entry.partition.as_str())
            .bind(&entry.source_file)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        info!(written, "index rebuilt");
        Ok(written)
    }

    /// All entries for one record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Database`] if the query fails or
    /// [`IndexError::Corrupt`] for an unreadable row.
    pub async fn entries_for(&self, record_id: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query_as::<_, IndexRow>(
            r"SELECT record_id, publication_date, partition, source_file
              FROM source_index
              WHERE record_id = ?
              ORDER BY id ASC",
        )
        .bind(record_id)
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(IndexEntry::try_from).collect()
    }

    /// Resolves record ids to archives with update-over-baseline precedence.
    ///
    /// # Errors
    ///
    /// Same as [`SourceIndex::entries_for`].
    #[instrument(skip(self, record_ids), fields(ids = record_ids.len()))]
    pub async fn resolve<S: AsRef<str> + Sync>(&self, record_ids: &[S]) -> Result<Resolution> {
        let mut entries = Vec::new();
        for id in record_ids {
            entries.extend(self.entries_for(id.as_ref()).await?);
        }
        Ok(resolve(record_ids, &entries))
    }

    /// Number of stored `(record_id, source_file)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Database`] if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM source_index")
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.try_get("total")?)
    }

    /// Closes the underlying database.
    pub async fn close(self) {
        self.db.close().await;
    }
}
