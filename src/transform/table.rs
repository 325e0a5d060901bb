//! Record tables: one JSON Lines file per transformed archive.
//!
//! `pubmed25n0001.xml.gz` becomes `pubmed25n0001.jsonl`, one [`TableRow`] per
//! line in document order. Tables are written to a `.tmp` sibling and renamed
//! into place, so only complete tables ever carry the table extension.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::TransformError;
use super::record::{BibliographicRecord, parse_archive};
use crate::remote::{ARCHIVE_EXTENSION, CHECKSUM_SUFFIX};

/// Extension of transformed tables.
pub const TABLE_EXTENSION: &str = ".jsonl";

/// Separator for multi-valued columns.
pub const LIST_SEPARATOR: &str = "; ";

const DOCUMENT_EXTENSION: &str = ".xml";
const PARTIAL_SUFFIX: &str = ".tmp";

/// Table file name for an archive name.
///
/// `X.xml.gz` becomes `X.jsonl`; any other `.gz` archive keeps its full name
/// (`notes.gz` becomes `notes.gz.jsonl`) so the mapping stays invertible.
/// Returns `None` when the name is not a `.gz` archive.
#[must_use]
pub fn table_file_name(archive_name: &str) -> Option<String> {
    let stem = archive_name.strip_suffix(ARCHIVE_EXTENSION)?;
    if stem.is_empty() {
        return None;
    }
    match stem.strip_suffix(DOCUMENT_EXTENSION) {
        Some("") => None,
        Some(document) if !document.ends_with(ARCHIVE_EXTENSION) => {
            Some(format!("{document}{TABLE_EXTENSION}"))
        }
        _ => Some(format!("{archive_name}{TABLE_EXTENSION}")),
    }
}

/// Archive name a table file was produced from; inverse of [`table_file_name`].
#[must_use]
pub fn archive_name_for_table(table_name: &str) -> Option<String> {
    let stem = table_name.strip_suffix(TABLE_EXTENSION)?;
    if stem.is_empty() || stem == ARCHIVE_EXTENSION {
        return None;
    }
    if stem.ends_with(ARCHIVE_EXTENSION) {
        return Some(stem.to_string());
    }
    Some(format!("{stem}{DOCUMENT_EXTENSION}{ARCHIVE_EXTENSION}"))
}

/// Flat serialized form of a [`BibliographicRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(rename = "PMID")]
    pub pmid: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Abstract")]
    pub abstract_text: Option<String>,
    #[serde(rename = "PublicationDate")]
    pub publication_date: Option<NaiveDate>,
    #[serde(rename = "RevisionDate")]
    pub revision_date: Option<NaiveDate>,
    #[serde(rename = "MeSHTerms")]
    pub mesh_terms: String,
    #[serde(rename = "Keywords")]
    pub keywords: String,
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Journal")]
    pub journal: Option<String>,
}

impl From<&BibliographicRecord> for TableRow {
    fn from(record: &BibliographicRecord) -> Self {
        Self {
            pmid: record.id.clone(),
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone(),
            publication_date: record.publication_date,
            revision_date: record.revision_date,
            mesh_terms: record.mesh_terms.join(LIST_SEPARATOR),
            keywords: record.keywords.join(LIST_SEPARATOR),
            authors: record.authors.join(LIST_SEPARATOR),
            journal: record.journal.clone(),
        }
    }
}

fn split_list(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(LIST_SEPARATOR).map(str::to_string).collect()
}

impl From<TableRow> for BibliographicRecord {
    fn from(row: TableRow) -> Self {
        Self {
            id: row.pmid,
            title: row.title,
            abstract_text: row.abstract_text,
            publication_date: row.publication_date,
            revision_date: row.revision_date,
            mesh_terms: split_list(&row.mesh_terms),
            keywords: split_list(&row.keywords),
            authors: split_list(&row.authors),
            journal: row.journal,
        }
    }
}

/// Result of transforming one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSummary {
    /// Archive file name the table came from.
    pub archive_name: String,
    /// Written table path.
    pub table_path: PathBuf,
    /// Number of rows written.
    pub records: usize,
}

/// Parses `archive` and writes its table into `output_dir`.
///
/// With `drop_source`, the archive and its `.md5` sidecar are deleted once
/// the table is in place.
///
/// # Errors
///
/// Returns [`TransformError`] if the archive cannot be parsed or the table
/// cannot be written. No table file is left behind on error.
#[instrument(fields(archive = %archive.display(), output_dir = %output_dir.display()))]
pub fn transform_archive(
    archive: &Path,
    output_dir: &Path,
    drop_source: bool,
) -> Result<TransformSummary, TransformError> {
    let archive_name = archive
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| TransformError::NotAnArchive {
            path: archive.to_path_buf(),
        })?;
    let table_name = table_file_name(&archive_name).ok_or_else(|| TransformError::NotAnArchive {
        path: archive.to_path_buf(),
    })?;

    let records = parse_archive(archive)?;
    let table_path = output_dir.join(&table_name);
    write_table(&table_path, &records)?;

    if drop_source {
        remove_source(archive)?;
        let sidecar = archive.with_file_name(format!("{archive_name}{CHECKSUM_SUFFIX}"));
        remove_source(&sidecar)?;
    }

    info!(records = records.len(), table = %table_path.display(), "archive transformed");
    Ok(TransformSummary {
        archive_name,
        table_path,
        records: records.len(),
    })
}

fn write_table(table_path: &Path, records: &[BibliographicRecord]) -> Result<(), TransformError> {
    let mut partial = table_path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = write_rows(&partial, records)
        .and_then(|()| std::fs::rename(&partial, table_path).map_err(|e| TransformError::io(table_path, e)));
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

fn write_rows(path: &Path, records: &[BibliographicRecord]) -> Result<(), TransformError> {
    let file = File::create(path).map_err(|e| TransformError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, &TableRow::from(record))
            .map_err(|e| TransformError::row(path, e))?;
        writer
            .write_all(b"\n")
            .map_err(|e| TransformError::io(path, e))?;
    }
    writer.flush().map_err(|e| TransformError::io(path, e))
}

fn remove_source(path: &Path) -> Result<(), TransformError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed source file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransformError::io(path, e)),
    }
}

/// The rows of one transformed archive, as handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTable {
    /// Archive file name the table came from.
    pub source_file: String,
    /// Records in document order.
    pub rows: Vec<BibliographicRecord>,
}

impl RecordTable {
    /// Reads one table file.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] for unreadable files, malformed rows or a
    /// file name without the table extension.
    pub fn read(path: &Path) -> Result<Self, TransformError> {
        let source_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(archive_name_for_table)
            .ok_or_else(|| TransformError::NotAnArchive {
                path: path.to_path_buf(),
            })?;

        let reader = BufReader::new(File::open(path).map_err(|e| TransformError::io(path, e))?);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| TransformError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let row: TableRow =
                serde_json::from_str(&line).map_err(|e| TransformError::row(path, e))?;
            rows.push(row.into());
        }
        Ok(Self { source_file, rows })
    }

    /// Reads every table in `dir`, ordered by file name.
    ///
    /// A missing directory yields no tables.
    ///
    /// # Errors
    ///
    /// Same as [`RecordTable::read`], plus directory listing failures.
    #[instrument(fields(dir = %dir.display()))]
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, TransformError> {
        let reader = match std::fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("table directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(TransformError::io(dir, e)),
        };

        let mut paths = Vec::new();
        for entry in reader {
            let path = entry.map_err(|e| TransformError::io(dir, e))?.path();
            let is_table = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| archive_name_for_table(name).is_some());
            if is_table && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let tables = paths
            .iter()
            .map(|path| Self::read(path))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(tables = tables.len(), "tables loaded");
        Ok(tables)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_file_name() {
        assert_eq!(
            table_file_name("pubmed25n0001.xml.gz").as_deref(),
            Some("pubmed25n0001.jsonl")
        );
        assert_eq!(table_file_name("notes.gz").as_deref(), Some("notes.gz.jsonl"));
        assert_eq!(
            table_file_name("odd.gz.xml.gz").as_deref(),
            Some("odd.gz.xml.gz.jsonl")
        );
        assert!(table_file_name("pubmed25n0001.xml").is_none());
        assert!(table_file_name(".xml.gz").is_none());
        assert!(table_file_name(".gz").is_none());
    }

    #[test]
    fn test_archive_name_for_table() {
        assert_eq!(
            archive_name_for_table("pubmed25n0001.jsonl").as_deref(),
            Some("pubmed25n0001.xml.gz")
        );
        assert_eq!(
            archive_name_for_table("notes.gz.jsonl").as_deref(),
            Some("notes.gz")
        );
        assert!(archive_name_for_table("pubmed25n0001.jsonl.tmp").is_none());
        assert!(archive_name_for_table(".jsonl").is_none());
        assert!(archive_name_for_table(".gz.jsonl").is_none());
    }

    #[test]
    fn test_table_names_invert_for_every_archive_shape() {
        for archive in [
            "pubmed25n0001.xml.gz",
            "notes.gz",
            "odd.gz.xml.gz",
            "a.b.xml.gz",
            "data.tar.gz",
        ] {
            let table = table_file_name(archive).unwrap();
            assert_eq!(
                archive_name_for_table(&table).as_deref(),
                Some(archive),
                "{archive} -> {table}"
            );
        }
    }

    #[test]
    fn test_row_uses_corpus_column_names_and_joins_lists() {
        let record = BibliographicRecord {
            id: Some("7".to_string()),
            publication_date: NaiveDate::from_ymd_opt(2025, 9, 14),
            mesh_terms: vec!["Humans".to_string(), "Mice".to_string()],
            ..BibliographicRecord::default()
        };
        let json = serde_json::to_value(TableRow::from(&record)).unwrap();
        assert_eq!(json["PMID"], "7");
        assert_eq!(json["PublicationDate"], "2025-09-14");
        assert_eq!(json["MeSHTerms"], "Humans; Mice");
        assert_eq!(json["Keywords"], "");
        assert!(json["Abstract"].is_null());
    }

    #[test]
    fn test_row_back_to_record_splits_lists() {
        let row = TableRow {
            authors: "A B; C D".to_string(),
            ..TableRow::default()
        };
        let record = BibliographicRecord::from(row);
        assert_eq!(record.authors, vec!["A B", "C D"]);
        assert!(record.keywords.is_empty());
    }
}
