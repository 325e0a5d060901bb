//! Error types for the source index.

use thiserror::Error;

use crate::db::DbError;
use crate::transform::TransformError;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Query failed.
    #[error("index query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Opening or migrating the index database failed.
    #[error(transparent)]
    Open(#[from] DbError),

    /// Reading transformed tables failed.
    #[error("cannot read record tables: {0}")]
    Table(#[from] TransformError),

    /// A stored row holds a value the schema should have rejected.
    #[error("corrupt index row for record {record_id}: {detail}")]
    Corrupt {
        /// Record identifier of the offending row.
        record_id: String,
        /// What was wrong.
        detail: String,
    },

    /// The blocking table reader task failed.
    #[error("table reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
