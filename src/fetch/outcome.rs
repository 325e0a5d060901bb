//! Per-file outcomes and the batch accumulator they fold into.

use std::path::PathBuf;

use crate::remote::RemoteFileEntry;

/// Result class of one file in one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Transferred completely and matched its published checksum (or has none).
    Verified,
    /// Transferred but the digest differs from the published one.
    ChecksumMismatch,
    /// The transfer itself failed.
    TransferFailed,
}

impl FetchStatus {
    /// Returns the lowercase label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::TransferFailed => "transfer_failed",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of fetching one file in one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The catalog entry that was fetched.
    pub file: RemoteFileEntry,
    /// Result class.
    pub status: FetchStatus,
    /// Local archive path; present only when verified.
    pub local_path: Option<PathBuf>,
    /// Failure description for logs and reports.
    pub error: Option<String>,
}

impl FetchOutcome {
    /// Creates a verified outcome.
    #[must_use]
    pub fn verified(file: RemoteFileEntry, local_path: PathBuf) -> Self {
        Self {
            file,
            status: FetchStatus::Verified,
            local_path: Some(local_path),
            error: None,
        }
    }

    /// Creates a failed outcome with the given status.
    pub fn failed(file: RemoteFileEntry, status: FetchStatus, error: impl Into<String>) -> Self {
        Self {
            file,
            status,
            local_path: None,
            error: Some(error.into()),
        }
    }

    /// Whether the file is ready for transformation.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == FetchStatus::Verified
    }
}

/// Final result of a batch fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Verified files, in the order they succeeded.
    pub succeeded: Vec<FetchOutcome>,
    /// Files still failing when the attempt budget ran out.
    pub failed: Vec<RemoteFileEntry>,
    /// Attempts actually run.
    pub attempts: u32,
    /// Number of files requested.
    pub requested: usize,
}

impl BatchReport {
    /// Percentage of requested files that ended verified, in `0.0..=100.0`.
    ///
    /// An empty batch has full coverage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage(&self) -> f64 {
        if self.requested == 0 {
            return 100.0;
        }
        let still_failed = self.failed.len().min(self.requested);
        (self.requested - still_failed) as f64 / self.requested as f64 * 100.0
    }

    /// Names of the permanently failed files.
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Whether every requested file was verified.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The narrowing work list threaded through the attempt loop.
///
/// Each attempt's outcomes are folded in with [`BatchProgress::absorb`]:
/// verified files move to the succeeded list and everything else becomes the
/// next attempt's work list.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pending: Vec<RemoteFileEntry>,
    succeeded: Vec<FetchOutcome>,
    attempts: u32,
    requested: usize,
}

impl BatchProgress {
    /// Starts with every requested entry pending and no attempts made.
    #[must_use]
    pub fn new(entries: Vec<RemoteFileEntry>) -> Self {
        Self {
            requested: entries.len(),
            pending: entries,
            succeeded: Vec::new(),
            attempts: 0,
        }
    }

    /// Entries the next attempt must process.
    #[must_use]
    pub fn pending(&self) -> &[RemoteFileEntry] {
        &self.pending
    }

    /// Attempts folded in so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether nothing remains to fetch.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Folds one attempt's outcomes into the accumulator.
    #[must_use]
    pub fn absorb(mut self, outcomes: Vec<FetchOutcome>) -> Self {
        self.attempts += 1;
        let mut next = Vec::new();
        for outcome in outcomes {
            if outcome.is_verified() {
                self.succeeded.push(outcome);
            } else {
                next.push(outcome.file);
            }
        }
        self.pending = next;
        self
    }

    /// Converts the accumulator into the final report; pending entries are
    /// reported as permanently failed.
    #[must_use]
    pub fn finish(self) -> BatchReport {
        BatchReport {
            succeeded: self.succeeded,
            failed: self.pending,
            attempts: self.attempts,
            requested: self.requested,
        }
    }
}
