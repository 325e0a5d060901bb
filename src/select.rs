//! Incremental selection of catalog entries.
//!
//! A run first narrows the catalog to a date window and then drops every
//! archive whose transformed table already exists locally. The set of
//! materialized archives is recomputed from the output directory on every run
//! and never persisted anywhere else.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{debug, instrument};

use crate::dates::{InvalidDate, parse_day_month_year};
use crate::remote::RemoteFileEntry;
use crate::transform::archive_name_for_table;

/// Keeps entries whose last-modified time falls within `[date_min, date_max]`.
///
/// Both bounds are `day/month/year` text at day granularity: `date_min` from
/// 00:00:00 and `date_max` through the last nanosecond of that day. Entries
/// without a timestamp are excluded.
///
/// # Errors
///
/// Returns [`InvalidDate`] when either bound is not a valid `d/m/Y` date.
pub fn select_by_date_range(
    entries: &[RemoteFileEntry],
    date_min: &str,
    date_max: &str,
) -> Result<Vec<RemoteFileEntry>, InvalidDate> {
    let start = parse_day_month_year(date_min)?.and_time(NaiveTime::MIN).and_utc();
    let end = parse_day_month_year(date_max)?
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .ok_or_else(|| InvalidDate {
            value: date_max.to_string(),
        })?
        .and_utc();

    Ok(within(entries, start, end))
}

fn within(
    entries: &[RemoteFileEntry],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<RemoteFileEntry> {
    entries
        .iter()
        .filter(|entry| {
            entry
                .last_modified
                .is_some_and(|stamp| start <= stamp && stamp <= end)
        })
        .cloned()
        .collect()
}

/// Keeps entries whose name is not in `already_materialized`.
#[must_use]
pub fn select_unprocessed(
    entries: &[RemoteFileEntry],
    already_materialized: &HashSet<String>,
) -> Vec<RemoteFileEntry> {
    entries
        .iter()
        .filter(|entry| !already_materialized.contains(&entry.name))
        .cloned()
        .collect()
}

/// Archive names whose transformed tables already exist in `output_dir`.
///
/// A missing directory is simply an empty set.
///
/// # Errors
///
/// Returns the underlying I/O error when the directory exists but cannot be
/// read.
#[instrument]
pub fn materialized_archives(output_dir: &Path) -> std::io::Result<HashSet<String>> {
    let reader = match std::fs::read_dir(output_dir) {
        Ok(reader) => reader,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(error) => return Err(error),
    };

    let mut archives = HashSet::new();
    for dir_entry in reader {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }
        let file_name = dir_entry.file_name();
        if let Some(archive) = file_name.to_str().and_then(archive_name_for_table) {
            archives.insert(archive);
        }
    }
    debug!(count = archives.len(), "materialized archives found");
    Ok(archives)
}
