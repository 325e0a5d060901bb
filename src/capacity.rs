//! Free-space check performed before any bulk transfer.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Bytes per gigabyte as used for the configured threshold (decimal).
pub const BYTES_PER_GB: u64 = 1_000_000_000;

/// The filesystem backing a directory could not be queried.
#[derive(Debug, Error)]
#[error("cannot query free space for {path}: {source}")]
pub struct CapacityError {
    /// Directory that was checked.
    pub path: PathBuf,
    /// The underlying IO error.
    #[source]
    pub source: std::io::Error,
}

/// Outcome of a capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityReport {
    /// Bytes available to the current user.
    pub available_bytes: u64,
    /// Bytes the threshold requires.
    pub required_bytes: u64,
}

impl CapacityReport {
    /// Whether the available space meets the threshold.
    #[must_use]
    pub fn is_sufficient(&self) -> bool {
        self.available_bytes >= self.required_bytes
    }

    /// Bytes missing to reach the threshold (zero when sufficient).
    #[must_use]
    pub fn shortfall_bytes(&self) -> u64 {
        self.required_bytes.saturating_sub(self.available_bytes)
    }
}

/// Checks the filesystem backing `target_dir` against `required_gb`.
///
/// # Errors
///
/// Returns [`CapacityError`] when the filesystem cannot be queried (for
/// example when `target_dir` does not exist).
#[instrument]
pub fn check(target_dir: &Path, required_gb: u64) -> Result<CapacityReport, CapacityError> {
    let available_bytes = fs2::available_space(target_dir).map_err(|source| CapacityError {
        path: target_dir.to_path_buf(),
        source,
    })?;
    let report = CapacityReport {
        available_bytes,
        required_bytes: required_gb.saturating_mul(BYTES_PER_GB),
    };
    debug!(
        available = report.available_bytes,
        required = report.required_bytes,
        "capacity checked"
    );
    Ok(report)
}

/// Whether `target_dir` has at least `required_gb` gigabytes free.
///
/// Insufficient space is `false`, not an error.
///
/// # Errors
///
/// Same as [`check`].
pub fn has_capacity(target_dir: &Path, required_gb: u64) -> Result<bool, CapacityError> {
    let report = check(target_dir, required_gb)?;
    if !report.is_sufficient() {
        warn!(
            dir = %target_dir.display(),
            shortfall_bytes = report.shortfall_bytes(),
            "insufficient free space"
        );
    }
    Ok(report.is_sufficient())
}
