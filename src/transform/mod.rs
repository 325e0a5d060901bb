//! Archive-to-table transformation.
//!
//! # Architecture
//!
//! - [`parse_archive`] / [`parse_document`] - one [`BibliographicRecord`] per
//!   `PubmedArticle`, fields located with the path helpers in `tree`
//! - [`normalize_date`] / [`parse_normalized_date`] - tolerant date handling
//! - [`transform_archive`] - writes a [`TableRow`] per record to `<stem>.jsonl`
//! - [`RecordTable`] - reads tables back for downstream consumers
//!
//! Parsing is CPU-bound and synchronous; async callers run it on the blocking
//! pool.

mod date;
mod error;
mod record;
mod table;
mod tree;

pub use date::{normalize_date, parse_loose_date, parse_normalized_date};
pub use error::TransformError;
pub use record::{BibliographicRecord, parse_archive, parse_document};
pub use table::{
    LIST_SEPARATOR, RecordTable, TABLE_EXTENSION, TableRow, TransformSummary,
    archive_name_for_table, table_file_name, transform_archive,
};
