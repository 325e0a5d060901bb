//! Attempt-sequential, integrity-checked batch fetcher.
//!
//! # Concurrency Model
//!
//! - Attempts run strictly one after another
//! - Within an attempt each file runs in its own Tokio task
//! - A semaphore permit is acquired before spawning each task and released
//!   when the task finishes (RAII)
//! - Every task owns its local archive (and sidecar) path exclusively
//!
//! # Retry Behavior
//!
//! Any failure (transfer error or checksum mismatch) removes the partial local
//! files and puts the entry back on the work list for the next attempt. The
//! loop stops when the work list is empty or the attempt budget is spent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::checksum::{compute_md5, parse_published_checksum};
use super::outcome::{BatchProgress, BatchReport, FetchOutcome, FetchStatus};
use crate::remote::{ChecksumKind, RemoteFileEntry, RemoteSource, TransferError};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 16;

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default attempt budget per batch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Error type for fetch engine construction and scheduling.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Batch fetcher with bounded per-attempt concurrency.
#[derive(Debug)]
pub struct FetchEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    attempt_pause: Duration,
}

impl Default for FetchEngine {
    fn default() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            concurrency: DEFAULT_CONCURRENCY,
            attempt_pause: Duration::ZERO,
        }
    }
}

impl FetchEngine {
    /// Creates an engine running up to `concurrency` transfers per attempt.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// `1..=16`.
    ///
    /// # Example
    ///
    /// ```
    /// use pubsync_core::fetch::FetchEngine;
    ///
    /// let engine = FetchEngine::new(4).unwrap();
    /// assert_eq!(engine.concurrency(), 4);
    /// ```
    #[instrument(level = "debug")]
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            attempt_pause: Duration::ZERO,
        })
    }

    /// Sets a fixed pause between attempts.
    #[must_use]
    pub fn with_attempt_pause(mut self, pause: Duration) -> Self {
        self.attempt_pause = pause;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetches and verifies `entries` from `remote_dir` into `local_dir`.
    ///
    /// `max_attempts` is clamped to at least one. Individual file failures
    /// never make this method fail; they are reported in the returned
    /// [`BatchReport`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(
        skip(self, entries, source),
        fields(requested = entries.len(), local_dir = %local_dir.display())
    )]
    pub async fn fetch_batch(
        &self,
        entries: Vec<RemoteFileEntry>,
        source: Arc<dyn RemoteSource>,
        remote_dir: &str,
        local_dir: &Path,
        max_attempts: u32,
    ) -> Result<BatchReport, EngineError> {
        let max_attempts = max_attempts.max(1);
        let mut progress = BatchProgress::new(entries);

        while !progress.is_done() && progress.attempts() < max_attempts {
            if progress.attempts() > 0 && !self.attempt_pause.is_zero() {
                tokio::time::sleep(self.attempt_pause).await;
            }
            let attempt = progress.attempts() + 1;
            info!(
                attempt,
                max_attempts,
                pending = progress.pending().len(),
                "starting fetch attempt"
            );
            let outcomes = self
                .run_attempt(&source, remote_dir, local_dir, progress.pending())
                .await?;
            progress = progress.absorb(outcomes);
        }

        let report = progress.finish();
        if report.is_complete() {
            info!(
                verified = report.succeeded.len(),
                attempts = report.attempts,
                "batch complete"
            );
        } else {
            warn!(
                verified = report.succeeded.len(),
                failed = report.failed.len(),
                coverage = report.coverage(),
                failed_files = ?report.failed_names(),
                "batch finished with permanent failures"
            );
        }
        Ok(report)
    }

    /// Runs one attempt over `work`, returning one outcome per entry in input
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    pub async fn run_attempt(
        &self,
        source: &Arc<dyn RemoteSource>,
        remote_dir: &str,
        local_dir: &Path,
        work: &[RemoteFileEntry],
    ) -> Result<Vec<FetchOutcome>, EngineError> {
        let mut handles = Vec::with_capacity(work.len());

        for entry in work {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let source = Arc::clone(source);
            let remote_dir = remote_dir.to_string();
            let local_dir = local_dir.to_path_buf();
            let task_entry = entry.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                fetch_one(source.as_ref(), &remote_dir, &local_dir, task_entry).await
            });
            handles.push((entry.clone(), handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (entry, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(name = %entry.name, error = %e, "fetch task panicked");
                    outcomes.push(FetchOutcome::failed(
                        entry,
                        FetchStatus::TransferFailed,
                        format!("fetch task aborted: {e}"),
                    ));
                }
            }
        }
        Ok(outcomes)
    }
}

/// Fetches a batch with the default engine configuration.
///
/// # Errors
///
/// See [`FetchEngine::fetch_batch`].
pub async fn fetch_batch(
    entries: Vec<RemoteFileEntry>,
    source: Arc<dyn RemoteSource>,
    remote_dir: &str,
    local_dir: &Path,
    max_attempts: u32,
) -> Result<BatchReport, EngineError> {
    FetchEngine::default()
        .fetch_batch(entries, source, remote_dir, local_dir, max_attempts)
        .await
}

/// Transfers and verifies one archive. Never leaves a partial file behind on
/// failure.
#[instrument(skip(source, local_dir, entry), fields(name = %entry.name))]
async fn fetch_one(
    source: &dyn RemoteSource,
    remote_dir: &str,
    local_dir: &Path,
    entry: RemoteFileEntry,
) -> FetchOutcome {
    let archive_path = local_dir.join(&entry.name);
    let sidecar_path = local_dir.join(entry.checksum_name());

    match transfer_and_verify(source, remote_dir, &entry, &archive_path, &sidecar_path).await {
        Ok(()) => {
            debug!(path = %archive_path.display(), "archive verified");
            FetchOutcome::verified(entry, archive_path)
        }
        Err(error) => {
            remove_if_present(&archive_path).await;
            remove_if_present(&sidecar_path).await;
            let status = if error.is_checksum_failure() {
                FetchStatus::ChecksumMismatch
            } else {
                FetchStatus::TransferFailed
            };
            warn!(status = %status, error = %error, "fetch failed for this attempt");
            FetchOutcome::failed(entry, status, error.to_string())
        }
    }
}

async fn transfer_and_verify(
    source: &dyn RemoteSource,
    remote_dir: &str,
    entry: &RemoteFileEntry,
    archive_path: &Path,
    sidecar_path: &Path,
) -> Result<(), TransferError> {
    let bytes = source.retrieve(remote_dir, &entry.name, archive_path).await?;
    if let Some(expected) = entry.size
        && expected != bytes
    {
        debug!(expected, received = bytes, "size differs from listing");
    }

    match entry.checksum_kind {
        ChecksumKind::None => {
            debug!("no published checksum; accepting complete transfer");
            Ok(())
        }
        ChecksumKind::Md5 => {
            source
                .retrieve(remote_dir, &entry.checksum_name(), sidecar_path)
                .await?;
            verify_md5(&entry.name, archive_path, sidecar_path).await
        }
    }
}

async fn verify_md5(
    name: &str,
    archive_path: &Path,
    sidecar_path: &Path,
) -> Result<(), TransferError> {
    let published = tokio::fs::read_to_string(sidecar_path)
        .await
        .map_err(|e| TransferError::io(sidecar_path, e))?;
    let expected =
        parse_published_checksum(&published).ok_or_else(|| TransferError::ChecksumUnreadable {
            name: name.to_string(),
        })?;
    let actual = compute_md5(archive_path)
        .await
        .map_err(|e| TransferError::io(archive_path, e))?;

    if actual == expected {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial file"),
    }
}
