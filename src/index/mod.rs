//! Reverse index from record identifier to source archive.
//!
//! Baseline and update archives can both contain a record; an update always
//! supersedes the baseline copy. Entries are built from transformed tables
//! and persisted in SQLite through [`SourceIndex`].

mod entry;
mod error;
mod store;

use std::path::Path;

use tracing::{info, instrument};

pub use entry::{IndexEntry, Partition, Resolution, build, entries_for_table, resolve};
pub use error::{IndexError, Result};
pub use store::SourceIndex;

use crate::transform::RecordTable;

/// Builds entries from the transformed tables of both partitions.
///
/// Reading runs on the blocking pool.
///
/// # Errors
///
/// Returns [`IndexError::Table`] if a table cannot be read.
#[instrument(fields(baseline = %baseline_dir.display(), update = %update_dir.display()))]
pub async fn build_from_dirs(baseline_dir: &Path, update_dir: &Path) -> Result<Vec<IndexEntry>> {
    let baseline_dir = baseline_dir.to_path_buf();
    let update_dir = update_dir.to_path_buf();

    let entries = tokio::task::spawn_blocking(move || -> Result<Vec<IndexEntry>> {
        let baseline = RecordTable::load_dir(&baseline_dir)?;
        let update = RecordTable::load_dir(&update_dir)?;
        Ok(build(&[
            (Partition::Baseline, baseline),
            (Partition::Update, update),
        ]))
    })
    .await??;

    info!(entries = entries.len(), "index entries built from tables");
    Ok(entries)
}
