//! HTTPS mirror of the corpus tree.
//!
//! The mirror exposes the same directories as the FTP server through a plain
//! autoindex page, so listing is a `GET` of the directory URL, metadata is a
//! `HEAD` of the file URL and transfers are streamed `GET`s.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::LAST_MODIFIED;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::listing::{parse_index_names, parse_index_rows};
use super::{RemoteFileEntry, RemoteSource, TransferError};

/// Default connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (30 minutes; baseline archives are large).
pub const READ_TIMEOUT_SECS: u64 = 1800;

/// HTTP implementation of [`RemoteSource`].
///
/// Created once and shared across the batch so requests reuse the client's
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    /// Creates a source rooted at `base_url` (e.g. `https://ftp.ncbi.nlm.nih.gov`).
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] for a malformed base URL and
    /// [`TransferError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, TransferError> {
        Self::with_timeouts(base_url, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a source with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Same as [`HttpSource::new`].
    pub fn with_timeouts(
        base_url: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransferError> {
        let mut base = Url::parse(base_url).map_err(|_| TransferError::invalid_url(base_url))?;
        if base.cannot_be_a_base() {
            return Err(TransferError::invalid_url(base_url));
        }
        // Relative joins would otherwise replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(default_user_agent())
            .build()
            .map_err(|e| TransferError::network(base_url, e))?;
        Ok(Self { client, base })
    }

    fn directory_url(&self, remote_dir: &str) -> Result<Url, TransferError> {
        let mut path = remote_dir.trim_start_matches('/').to_string();
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        self.base
            .join(&path)
            .map_err(|_| TransferError::invalid_url(format!("{}{path}", self.base)))
    }

    fn file_url(&self, remote_dir: &str, name: &str) -> Result<Url, TransferError> {
        let directory = self.directory_url(remote_dir)?;
        directory
            .join(name)
            .map_err(|_| TransferError::invalid_url(format!("{directory}{name}")))
    }

    async fn fetch_index(&self, remote_dir: &str) -> Result<String, TransferError> {
        let url = self.directory_url(remote_dir)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransferError::network(url.as_str(), e))?;
        let response = ensure_success(response, url.as_str())?;
        response
            .text()
            .await
            .map_err(|e| TransferError::network(url.as_str(), e))
    }
}

fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("pubsync/{version} (corpus-mirror)")
}

fn ensure_success(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransferError::http_status(url, status.as_u16()))
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    fn target(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    #[instrument(skip(self), fields(base = %self.base))]
    async fn list_names(&self, remote_dir: &str) -> Result<Vec<String>, TransferError> {
        let html = self.fetch_index(remote_dir).await?;
        Ok(parse_index_names(&html))
    }

    #[instrument(skip(self), fields(base = %self.base))]
    async fn list_details(
        &self,
        remote_dir: &str,
    ) -> Result<Vec<RemoteFileEntry>, TransferError> {
        let html = self.fetch_index(remote_dir).await?;
        let rows = parse_index_rows(&html);
        if rows.is_empty() && !parse_index_names(&html).is_empty() {
            warn!(remote_dir, "autoindex rows carry no size/date columns");
        }
        Ok(rows)
    }

    async fn modified_time(
        &self,
        remote_dir: &str,
        name: &str,
    ) -> Result<DateTime<Utc>, TransferError> {
        let url = self.file_url(remote_dir, name)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| TransferError::network(url.as_str(), e))?;
        let response = ensure_success(response, url.as_str())?;

        let raw = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| TransferError::timestamp(name, "<missing Last-Modified>"))?;
        let stamp = httpdate::parse_http_date(raw).map_err(|_| TransferError::timestamp(name, raw))?;
        Ok(DateTime::<Utc>::from(stamp))
    }

    #[instrument(skip(self, destination), fields(dest = %destination.display()))]
    async fn retrieve(
        &self,
        remote_dir: &str,
        name: &str,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        let url = self.file_url(remote_dir, name)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransferError::network(url.as_str(), e))?;
        let response = ensure_success(response, url.as_str())?;

        let mut file = File::create(destination)
            .await
            .map_err(|e| TransferError::io(destination, e))?;
        match stream_to_file(&mut file, response, url.as_str(), destination).await {
            Ok(bytes) => {
                debug!(name, bytes, "transfer complete");
                Ok(bytes)
            }
            Err(error) => {
                drop(file);
                let _ = tokio::fs::remove_file(destination).await;
                Err(error)
            }
        }
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| TransferError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_url_normalizes_slashes() {
        let source = HttpSource::new("https://ftp.example.org").unwrap();
        assert_eq!(
            source.directory_url("/pubmed/updatefiles").unwrap().as_str(),
            "https://ftp.example.org/pubmed/updatefiles/"
        );
        assert_eq!(
            source.directory_url("pubmed/baseline/").unwrap().as_str(),
            "https://ftp.example.org/pubmed/baseline/"
        );
    }

    #[test]
    fn test_file_url_joins_name() {
        let source = HttpSource::new("https://ftp.example.org/").unwrap();
        assert_eq!(
            source
                .file_url("/pubmed/baseline/", "pubmed25n0001.xml.gz")
                .unwrap()
                .as_str(),
            "https://ftp.example.org/pubmed/baseline/pubmed25n0001.xml.gz"
        );
    }

    #[test]
    fn test_new_rejects_invalid_base() {
        let error = HttpSource::new("not a url").unwrap_err();
        assert!(matches!(error, TransferError::InvalidUrl { .. }));
    }

    #[test]
    fn test_target_has_no_trailing_slash() {
        let source = HttpSource::new("https://ftp.example.org/").unwrap();
        assert_eq!(source.target(), "https://ftp.example.org");
    }
}
