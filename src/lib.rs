//! Pubsync Core Library
//!
//! Incrementally mirrors the PubMed archive corpus: lists the remote
//! partitions, picks the archives that are new or inside a date window,
//! fetches them with checksum verification and bounded retries, turns each
//! archive into a flat record table, and keeps a reverse index from record
//! id to source archive.
//!
//! # Architecture
//!
//! - [`remote`] - FTP and HTTPS sources plus the remote catalog
//! - [`select`] - Date-window and resume filters over the catalog
//! - [`capacity`] - Free-space guard for the output volume
//! - [`fetch`] - Concurrent, verified, retrying batch fetcher
//! - [`transform`] - Archive document to record table
//! - [`index`] - Record id to archive index with partition precedence
//! - [`sync`] - One end-to-end run over a partition
//! - [`db`] - Database connection and schema management
//! - [`config`] - Optional on-disk defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capacity;
pub mod config;
pub mod dates;
pub mod db;
pub mod fetch;
pub mod index;
pub mod remote;
pub mod select;
pub mod sync;
pub mod transform;

// Re-export commonly used types
pub use capacity::{CapacityError, CapacityReport, has_capacity};
pub use config::{ConfigError, FileConfig};
pub use db::{Database, DbError};
pub use fetch::{
    BatchReport, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, EngineError, FetchEngine,
    FetchOutcome, FetchStatus, fetch_batch,
};
pub use index::{IndexEntry, IndexError, Partition, Resolution, SourceIndex, build_from_dirs};
pub use remote::{
    CatalogError, ChecksumKind, Credentials, FtpSource, HttpSource, RemoteFileEntry,
    RemoteSource, TransferError, list_files, list_files_with_size_and_date,
};
pub use select::{select_by_date_range, select_unprocessed};
pub use sync::{
    DEFAULT_MIN_FREE_GB, DateWindow, ListingMode, SyncError, SyncOptions, SyncReport,
    Synchronizer, plan,
};
pub use transform::{
    BibliographicRecord, RecordTable, TransformError, TransformSummary, normalize_date,
    transform_archive,
};
