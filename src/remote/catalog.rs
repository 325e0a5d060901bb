//! Catalog snapshots of a remote archive directory.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use super::{CatalogError, ChecksumKind, RemoteFileEntry, RemoteSource};

/// Extension of the compressed archives the catalog tracks.
pub const ARCHIVE_EXTENSION: &str = ".gz";

/// Suffix of the published checksum sidecar (`<archive>.md5`).
pub const CHECKSUM_SUFFIX: &str = ".md5";

fn is_archive(name: &str) -> bool {
    name.ends_with(ARCHIVE_EXTENSION)
}

/// Lists the archives of `remote_dir`, resolving each one's last-modified
/// time with a dedicated metadata round trip.
///
/// Checksum sidecars and any other non-archive entries are excluded; an
/// archive whose `<name>.md5` is listed alongside it is tagged
/// [`ChecksumKind::Md5`].
///
/// # Errors
///
/// - [`CatalogError::Unavailable`] when the directory cannot be listed. There
///   is no empty-list fallback.
/// - [`CatalogError::Metadata`] when a listed archive's timestamp cannot be
///   resolved.
#[instrument(skip(source), fields(target = %source.target()))]
pub async fn list_files(
    source: &dyn RemoteSource,
    remote_dir: &str,
) -> Result<Vec<RemoteFileEntry>, CatalogError> {
    let names = source
        .list_names(remote_dir)
        .await
        .map_err(|e| CatalogError::Unavailable {
            target: source.target(),
            directory: remote_dir.to_string(),
            source: e,
        })?;

    let listed: HashSet<&str> = names.iter().map(String::as_str).collect();
    let mut entries = Vec::new();

    for name in names.iter().filter(|name| is_archive(name)) {
        let last_modified = source
            .modified_time(remote_dir, name)
            .await
            .map_err(|e| CatalogError::Metadata {
                name: name.clone(),
                source: e,
            })?;

        let mut entry = RemoteFileEntry::new(name.as_str()).with_last_modified(last_modified);
        if listed.contains(entry.checksum_name().as_str()) {
            entry = entry.with_checksum(ChecksumKind::Md5);
        }
        debug!(name = %entry.name, modified = %last_modified, "catalogued archive");
        entries.push(entry);
    }

    info!(
        remote_dir,
        listed = names.len(),
        archives = entries.len(),
        "catalog snapshot complete"
    );
    Ok(entries)
}

/// Lists the archives of `remote_dir` using only the detail listing, taking
/// size and date from the listing lines themselves.
///
/// Entries whose date cannot be derived keep `last_modified = None`.
///
/// # Errors
///
/// [`CatalogError::Unavailable`] when the directory cannot be listed.
#[instrument(skip(source), fields(target = %source.target()))]
pub async fn list_files_with_size_and_date(
    source: &dyn RemoteSource,
    remote_dir: &str,
) -> Result<Vec<RemoteFileEntry>, CatalogError> {
    let details = source
        .list_details(remote_dir)
        .await
        .map_err(|e| CatalogError::Unavailable {
            target: source.target(),
            directory: remote_dir.to_string(),
            source: e,
        })?;

    let listed: HashSet<String> = details.iter().map(|entry| entry.name.clone()).collect();
    let entries: Vec<RemoteFileEntry> = details
        .into_iter()
        .filter(|entry| is_archive(&entry.name))
        .map(|entry| {
            if entry.last_modified.is_none() {
                warn!(name = %entry.name, "no date derivable from listing");
            }
            if listed.contains(&entry.checksum_name()) {
                entry.with_checksum(ChecksumKind::Md5)
            } else {
                entry
            }
        })
        .collect();

    info!(remote_dir, archives = entries.len(), "detail listing complete");
    Ok(entries)
}
