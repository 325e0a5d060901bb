//! Remote corpus access: the transport seam and the archive catalog.
//!
//! # Architecture
//!
//! - [`RemoteSource`] - async trait each transport implements
//! - [`FtpSource`] - passive-mode FTP client (the canonical corpus server)
//! - [`HttpSource`] - client for the HTTPS mirror of the same tree
//! - [`list_files`] / [`list_files_with_size_and_date`] - catalog snapshots
//!
//! # Example
//!
//! ```no_run
//! use pubsync_core::remote::{FtpSource, list_files};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = FtpSource::new("ftp.ncbi.nlm.nih.gov");
//! let entries = list_files(&source, "/pubmed/updatefiles/").await?;
//! println!("{} archives available", entries.len());
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;
mod ftp;
mod http;
mod listing;

pub use catalog::{ARCHIVE_EXTENSION, CHECKSUM_SUFFIX, list_files, list_files_with_size_and_date};
pub use error::{CatalogError, TransferError};
pub use ftp::{Credentials, DEFAULT_FTP_PORT, FtpSource};
pub use http::HttpSource;
pub use listing::{parse_index_names, parse_index_rows, parse_list_line, parse_mdtm_timestamp};

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Whether an archive has a published checksum sidecar next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumKind {
    /// No sidecar; transfers are accepted once complete.
    #[default]
    None,
    /// `<name>.md5` holds the archive's MD5 digest.
    Md5,
}

/// One archive file as seen in the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    /// File name within the remote directory.
    pub name: String,
    /// Size in bytes, when the listing exposes it.
    pub size: Option<u64>,
    /// Last modification time, when resolvable.
    pub last_modified: Option<DateTime<Utc>>,
    /// Published checksum kind.
    pub checksum_kind: ChecksumKind,
}

impl RemoteFileEntry {
    /// Creates an entry with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            last_modified: None,
            checksum_kind: ChecksumKind::None,
        }
    }

    /// Sets the last modification time.
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Sets the published checksum kind.
    #[must_use]
    pub fn with_checksum(mut self, checksum_kind: ChecksumKind) -> Self {
        self.checksum_kind = checksum_kind;
        self
    }

    /// Name of the checksum sidecar for this archive.
    #[must_use]
    pub fn checksum_name(&self) -> String {
        format!("{}{CHECKSUM_SUFFIX}", self.name)
    }
}

/// Data-access contract for a remote corpus tree.
///
/// Implementations must be usable from several concurrent transfer workers;
/// they decide internally whether that shares one connection or not.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Short description of the target (host or base URL) for logs and errors.
    fn target(&self) -> String;

    /// Lists the bare file names of a remote directory.
    async fn list_names(&self, remote_dir: &str) -> Result<Vec<String>, TransferError>;

    /// Lists a remote directory with whatever size/date detail the listing
    /// itself carries, without per-file round trips.
    async fn list_details(&self, remote_dir: &str)
    -> Result<Vec<RemoteFileEntry>, TransferError>;

    /// Resolves one file's modification time with a dedicated round trip.
    async fn modified_time(
        &self,
        remote_dir: &str,
        name: &str,
    ) -> Result<DateTime<Utc>, TransferError>;

    /// Transfers one file in binary mode to `destination`, returning bytes written.
    async fn retrieve(
        &self,
        remote_dir: &str,
        name: &str,
        destination: &Path,
    ) -> Result<u64, TransferError>;
}
