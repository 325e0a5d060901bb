//! Synthetic corpus archives and an in-memory remote tree.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use md5::{Digest, Md5};
use pubsync_core::{RemoteFileEntry, RemoteSource, TransferError};

/// One `PubmedArticle` element.
pub fn article(pmid: &str, title: &str, abstract_text: Option<&str>) -> String {
    let abstract_block = abstract_text
        .map(|text| format!("<Abstract><AbstractText>{text}</AbstractText></Abstract>"))
        .unwrap_or_default();
    format!(
        "<PubmedArticle><MedlineCitation Status=\"MEDLINE\">\
         <PMID Version=\"1\">{pmid}</PMID>\
         <DateRevised><Year>2025</Year><Month>09</Month><Day>14</Day></DateRevised>\
         <Article>\
         <Journal><JournalIssue><PubDate><Year>2024</Year><Month>Sep</Month></PubDate></JournalIssue>\
         <Title>Journal of Synthetic Data</Title></Journal>\
         <ArticleTitle>{title}</ArticleTitle>\
         {abstract_block}\
         <AuthorList><Author><LastName>Lovelace</LastName><ForeName>Ada</ForeName></Author></AuthorList>\
         </Article>\
         <MeshHeadingList><MeshHeading><DescriptorName UI=\"D1\">Humans</DescriptorName></MeshHeading></MeshHeadingList>\
         <KeywordList><Keyword>synthetic</Keyword></KeywordList>\
         </MedlineCitation></PubmedArticle>"
    )
}

/// A full document around `articles`.
pub fn article_set(articles: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<PubmedArticleSet>{}</PubmedArticleSet>",
        articles.concat()
    )
}

/// The two-record document: the second record has no abstract.
pub fn two_record_document() -> String {
    article_set(&[
        article("1001", "First title", Some("First abstract.")),
        article("1002", "Second title", None),
    ])
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .expect("gzip into memory");
    encoder.finish().expect("finish gzip")
}

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Sidecar contents in the corpus server's layout.
pub fn md5_sidecar(name: &str, bytes: &[u8]) -> Vec<u8> {
    format!("MD5({name})= {}\n", md5_hex(bytes)).into_bytes()
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

struct StoredFile {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

/// A single remote directory held in memory.
///
/// Archives get a correct `.md5` sidecar on insertion. Retrieval failures
/// can be scripted per file name.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<BTreeMap<String, StoredFile>>,
    failures: Mutex<HashMap<String, u32>>,
    archive_retrievals: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an archive and its matching checksum sidecar.
    pub fn add_archive(&self, name: &str, bytes: Vec<u8>, modified: DateTime<Utc>) {
        let sidecar = md5_sidecar(name, &bytes);
        let mut files = self.files.lock().expect("files lock");
        files.insert(
            format!("{name}.md5"),
            StoredFile {
                bytes: sidecar,
                modified,
            },
        );
        files.insert(name.to_string(), StoredFile { bytes, modified });
    }

    /// Adds a file without any sidecar.
    pub fn add_plain(&self, name: &str, bytes: Vec<u8>, modified: DateTime<Utc>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(name.to_string(), StoredFile { bytes, modified });
    }

    /// Replaces the published digest of `name` with one that never matches.
    pub fn corrupt_sidecar(&self, name: &str) {
        let mut files = self.files.lock().expect("files lock");
        if let Some(sidecar) = files.get_mut(&format!("{name}.md5")) {
            sidecar.bytes = format!("MD5({name})= {}\n", "0".repeat(32)).into_bytes();
        }
    }

    /// Makes the next `times` retrievals of `name` fail mid-transfer.
    pub fn fail_retrievals(&self, name: &str, times: u32) {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(name.to_string(), times);
    }

    /// Archive (non-sidecar) retrievals performed so far, including failed ones.
    pub fn archive_retrievals(&self) -> usize {
        self.archive_retrievals.load(Ordering::SeqCst)
    }

    fn take_failure(&self, name: &str) -> bool {
        let mut failures = self.failures.lock().expect("failures lock");
        match failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    fn target(&self) -> String {
        "memory".to_string()
    }

    async fn list_names(&self, _remote_dir: &str) -> Result<Vec<String>, TransferError> {
        Ok(self.files.lock().expect("files lock").keys().cloned().collect())
    }

    async fn list_details(
        &self,
        _remote_dir: &str,
    ) -> Result<Vec<RemoteFileEntry>, TransferError> {
        let files = self.files.lock().expect("files lock");
        Ok(files
            .iter()
            .map(|(name, file)| {
                let mut entry = RemoteFileEntry::new(name.as_str()).with_last_modified(file.modified);
                entry.size = Some(file.bytes.len() as u64);
                entry
            })
            .collect())
    }

    async fn modified_time(
        &self,
        _remote_dir: &str,
        name: &str,
    ) -> Result<DateTime<Utc>, TransferError> {
        self.files
            .lock()
            .expect("files lock")
            .get(name)
            .map(|file| file.modified)
            .ok_or_else(|| TransferError::protocol("MDTM", 550, format!("{name}: not found")))
    }

    async fn retrieve(
        &self,
        _remote_dir: &str,
        name: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        if !name.ends_with(".md5") {
            self.archive_retrievals.fetch_add(1, Ordering::SeqCst);
        }
        if self.take_failure(name) {
            tokio::fs::write(destination, b"partial")
                .await
                .map_err(|e| TransferError::io(destination, e))?;
            return Err(TransferError::connection_lost(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "scripted reset",
            )));
        }

        let bytes = self
            .files
            .lock()
            .expect("files lock")
            .get(name)
            .map(|file| file.bytes.clone())
            .ok_or_else(|| TransferError::protocol("RETR", 550, format!("{name}: not found")))?;
        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|e| TransferError::io(destination, e))?;
        Ok(bytes.len() as u64)
    }
}
