//! Error types for archive transformation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning an archive into a record table.
///
/// Missing fields are never errors; only an unreadable archive, a malformed
/// document or a failed write is.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Reading the archive or writing the table failed.
    #[error("IO error for {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The decompressed document is not well-formed XML.
    #[error("malformed document in {path}: {source}")]
    Document {
        /// The archive path.
        path: PathBuf,
        /// The XML parser error.
        #[source]
        source: roxmltree::Error,
    },

    /// A table line could not be encoded or decoded.
    #[error("bad table row in {path}: {source}")]
    Row {
        /// The table path.
        path: PathBuf,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The archive name does not end in `.gz`.
    #[error("not a compressed archive: {path}")]
    NotAnArchive {
        /// The offending path.
        path: PathBuf,
    },
}

impl TransformError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a document error.
    pub fn document(path: impl Into<PathBuf>, source: roxmltree::Error) -> Self {
        Self::Document {
            path: path.into(),
            source,
        }
    }

    /// Creates a row error.
    pub fn row(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Row {
            path: path.into(),
            source,
        }
    }
}
