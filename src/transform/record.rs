//! Field extraction from `PubmedArticleSet` documents.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, instrument};

use super::TransformError;
use super::date::parse_loose_date;
use super::tree::{find, find_all, find_text, text_of};

/// One bibliographic entry. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibliographicRecord {
    /// Record identifier (PMID).
    pub id: Option<String>,
    /// Article title with inline markup flattened.
    pub title: Option<String>,
    /// Abstract sections joined with a single space.
    pub abstract_text: Option<String>,
    /// Journal issue publication date.
    pub publication_date: Option<NaiveDate>,
    /// Citation revision date.
    pub revision_date: Option<NaiveDate>,
    /// MeSH descriptor names in document order.
    pub mesh_terms: Vec<String>,
    /// Keywords in document order.
    pub keywords: Vec<String>,
    /// Author display names in document order.
    pub authors: Vec<String>,
    /// Journal title.
    pub journal: Option<String>,
}

/// Decompresses and parses one archive into its records, in document order.
///
/// # Errors
///
/// Returns [`TransformError::Io`] when the archive cannot be read or
/// decompressed and [`TransformError::Document`] when the XML is malformed.
#[instrument(fields(path = %path.display()))]
pub fn parse_archive(path: &Path) -> Result<Vec<BibliographicRecord>, TransformError> {
    let file = std::fs::File::open(path).map_err(|e| TransformError::io(path, e))?;
    let mut xml = String::new();
    GzDecoder::new(file)
        .read_to_string(&mut xml)
        .map_err(|e| TransformError::io(path, e))?;

    let records = parse_document(&xml).map_err(|e| TransformError::document(path, e))?;
    debug!(records = records.len(), "archive parsed");
    Ok(records)
}

/// Parses an uncompressed `PubmedArticleSet` document.
///
/// # Errors
///
/// Returns the parser error when the XML is malformed.
pub fn parse_document(xml: &str) -> Result<Vec<BibliographicRecord>, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(xml, options)?;
    Ok(find_all(document.root_element(), "PubmedArticle")
        .into_iter()
        .map(extract_record)
        .collect())
}

fn extract_record(article: Node<'_, '_>) -> BibliographicRecord {
    let abstract_sections: Vec<String> = find_all(article, ".//Abstract/AbstractText")
        .into_iter()
        .filter_map(text_of)
        .collect();

    BibliographicRecord {
        id: find_text(article, ".//PMID"),
        title: find_text(article, ".//ArticleTitle"),
        abstract_text: (!abstract_sections.is_empty()).then(|| abstract_sections.join(" ")),
        publication_date: find(article, ".//Article/Journal/JournalIssue/PubDate")
            .and_then(compose_date)
            .as_deref()
            .and_then(parse_loose_date),
        revision_date: find(article, ".//MedlineCitation/DateRevised")
            .and_then(compose_date)
            .as_deref()
            .and_then(parse_loose_date),
        mesh_terms: find_all(article, ".//MeshHeading")
            .into_iter()
            .filter_map(|heading| find_text(heading, "DescriptorName"))
            .collect(),
        keywords: find_all(article, ".//Keyword")
            .into_iter()
            .filter_map(text_of)
            .collect(),
        authors: find_all(article, ".//Author")
            .into_iter()
            .filter_map(author_name)
            .collect(),
        journal: find_text(article, ".//Journal/Title"),
    }
}

/// `Year-Month-Day` from the present parts, or the free-text `MedlineDate`
/// when there is no `Year`.
fn compose_date(date: Node<'_, '_>) -> Option<String> {
    let Some(year) = find_text(date, "Year") else {
        return find_text(date, "MedlineDate");
    };
    let mut parts = vec![year];
    parts.extend(find_text(date, "Month"));
    parts.extend(find_text(date, "Day"));
    Some(parts.join("-"))
}

/// `ForeName LastName`, then `Initials LastName`, then whichever single part
/// exists, then the collective name.
fn author_name(author: Node<'_, '_>) -> Option<String> {
    let last = find_text(author, "LastName");
    let given = find_text(author, "ForeName").or_else(|| find_text(author, "Initials"));
    match (given, last) {
        (Some(given), Some(last)) => Some(format!("{given} {last}")),
        (given, last) => last
            .or(given)
            .or_else(|| find_text(author, "CollectiveName")),
    }
}
