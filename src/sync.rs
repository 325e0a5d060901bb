//! One synchronization run over a single corpus partition.
//!
//! Control flow: catalog → date window → resume filter → capacity-gated
//! batch fetch → per-archive transformation on the blocking pool → fold of
//! new tables into the source index.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::capacity::{self, CapacityError};
use crate::dates::{InvalidDate, parse_day_month_year};
use crate::fetch::{
    BatchReport, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, EngineError, FetchEngine,
};
use crate::index::{IndexError, Partition, SourceIndex, entries_for_table};
use crate::remote::{
    CatalogError, RemoteFileEntry, RemoteSource, list_files, list_files_with_size_and_date,
};
use crate::select::{materialized_archives, select_by_date_range, select_unprocessed};
use crate::transform::{RecordTable, TransformSummary, transform_archive};

/// Default free-space threshold in gigabytes.
pub const DEFAULT_MIN_FREE_GB: u64 = 15;

/// Errors that abort a run. Per-file failures are reported in [`SyncReport`]
/// instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local directory could not be created or scanned.
    #[error("IO error for {path}: {source}")]
    Io {
        /// The directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Free space could not be determined.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Not enough free space to start the batch.
    #[error(
        "insufficient free space in {dir}: {available_bytes} bytes available, {required_bytes} required (short by {shortfall_bytes})"
    )]
    CapacityInsufficient {
        /// Target directory.
        dir: PathBuf,
        /// Bytes available.
        available_bytes: u64,
        /// Bytes required.
        required_bytes: u64,
        /// Missing bytes.
        shortfall_bytes: u64,
    },

    /// The remote catalog could not be built.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A date-window bound is invalid.
    #[error(transparent)]
    InvalidDate(#[from] InvalidDate),

    /// The fetch engine could not be configured or scheduled.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Writing to the source index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// How archive timestamps are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingMode {
    /// One metadata round trip per archive (exact timestamps).
    #[default]
    PerFile,
    /// Sizes and dates taken from the detail listing in one request.
    DetailListing,
}

/// Inclusive `day/month/year` window over archive modification times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    /// First day, e.g. `01/09/2025`.
    pub from: String,
    /// Last day, e.g. `14/09/2025`.
    pub to: String,
}

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Partition to synchronize.
    pub partition: Partition,
    /// Remote directory; defaults to the partition's directory.
    pub remote_dir: String,
    /// Local directory receiving archives and tables.
    pub output_dir: PathBuf,
    /// Optional modification-time window.
    pub window: Option<DateWindow>,
    /// Re-process archives even when their table already exists.
    pub override_existing: bool,
    /// Attempt budget for the fetch.
    pub max_attempts: u32,
    /// Free space required before fetching, in gigabytes.
    pub min_free_gb: u64,
    /// Concurrent transfers per attempt.
    pub concurrency: usize,
    /// Delete archives and sidecars after transformation.
    pub drop_archives: bool,
    /// Fixed pause between fetch attempts.
    pub attempt_pause: Duration,
    /// Catalog strategy.
    pub listing: ListingMode,
}

impl SyncOptions {
    /// Options with defaults for `partition` writing into `output_dir`.
    pub fn new(partition: Partition, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            partition,
            remote_dir: partition.remote_dir().to_string(),
            output_dir: output_dir.into(),
            window: None,
            override_existing: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_free_gb: DEFAULT_MIN_FREE_GB,
            concurrency: DEFAULT_CONCURRENCY,
            drop_archives: true,
            attempt_pause: Duration::ZERO,
            listing: ListingMode::PerFile,
        }
    }
}

/// An archive that was fetched but could not be transformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFailure {
    /// Archive file name.
    pub archive_name: String,
    /// Error description.
    pub error: String,
}

/// Everything a run did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Partition synchronized.
    pub partition: Partition,
    /// Archives in the catalog snapshot.
    pub listed: usize,
    /// Archives inside the date window (all listed when no window).
    pub in_window: usize,
    /// Archives skipped because their table already existed.
    pub skipped: usize,
    /// Fetch outcome for the selected archives.
    pub fetch: BatchReport,
    /// Archives transformed into tables.
    pub transformed: Vec<TransformSummary>,
    /// Verified archives whose transformation failed.
    pub transform_failures: Vec<TransformFailure>,
    /// Index rows written.
    pub indexed: u64,
}

impl SyncReport {
    /// Whether every selected archive ended up as a table.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fetch.is_complete() && self.transform_failures.is_empty()
    }
}

/// Runs the fetch-and-transform pipeline against one remote source.
pub struct Synchronizer {
    source: Arc<dyn RemoteSource>,
    index: Option<SourceIndex>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("source", &self.source.target())
            .field("index", &self.index.is_some())
            .finish()
    }
}

impl Synchronizer {
    /// Creates a synchronizer without an index.
    #[must_use]
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            index: None,
        }
    }

    /// Folds every new table into `index`.
    #[must_use]
    pub fn with_index(mut self, index: SourceIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Runs one synchronization.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] for failures that abort the run before or
    /// outside the per-file work: directory creation, capacity, catalog,
    /// invalid window, engine configuration and index writes. Fetch and
    /// transformation failures of individual archives are reported in the
    /// returned [`SyncReport`].
    #[instrument(
        skip(self, options),
        fields(partition = %options.partition, output_dir = %options.output_dir.display())
    )]
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport, SyncError> {
        let output_dir = &options.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| SyncError::Io {
                path: output_dir.clone(),
                source,
            })?;

        let capacity = capacity::check(output_dir, options.min_free_gb)?;
        if !capacity.is_sufficient() {
            return Err(SyncError::CapacityInsufficient {
                dir: output_dir.clone(),
                available_bytes: capacity.available_bytes,
                required_bytes: capacity.required_bytes,
                shortfall_bytes: capacity.shortfall_bytes(),
            });
        }

        let Selection {
            listed,
            in_window,
            selected,
        } = select(self.source.as_ref(), options).await?;
        let skipped = in_window - selected.len();
        info!(
            listed,
            in_window,
            skipped,
            selected = selected.len(),
            "selection complete"
        );

        let engine = FetchEngine::new(options.concurrency)?.with_attempt_pause(options.attempt_pause);
        let fetch = engine
            .fetch_batch(
                selected,
                Arc::clone(&self.source),
                &options.remote_dir,
                output_dir,
                options.max_attempts,
            )
            .await?;

        let verified: Vec<PathBuf> = fetch
            .succeeded
            .iter()
            .filter_map(|outcome| outcome.local_path.clone())
            .collect();
        let (transformed, transform_failures) = transform_all(verified, options).await;

        let indexed = match &self.index {
            Some(index) => fold_into_index(index, options.partition, &transformed).await?,
            None => 0,
        };

        let report = SyncReport {
            partition: options.partition,
            listed,
            in_window,
            skipped,
            fetch,
            transformed,
            transform_failures,
            indexed,
        };
        if report.is_complete() {
            info!(
                transformed = report.transformed.len(),
                indexed, "sync complete"
            );
        } else {
            warn!(
                fetch_failed = report.fetch.failed.len(),
                transform_failed = report.transform_failures.len(),
                coverage = report.fetch.coverage(),
                "sync finished with failures"
            );
        }
        Ok(report)
    }
}

async fn transform_all(
    archives: Vec<PathBuf>,
    options: &SyncOptions,
) -> (Vec<TransformSummary>, Vec<TransformFailure>) {
    // Each parse holds a whole decompressed document in memory.
    let workers = std::thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut handles = Vec::with_capacity(archives.len());

    for archive in archives {
        let name = archive_display_name(&archive);
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            handles.push((name, None));
            continue;
        };
        let output_dir = options.output_dir.clone();
        let drop_source = options.drop_archives;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            transform_archive(&archive, &output_dir, drop_source)
        });
        handles.push((name, Some(handle)));
    }

    let mut transformed = Vec::new();
    let mut failures = Vec::new();
    for (archive_name, handle) in handles {
        let Some(handle) = handle else {
            failures.push(TransformFailure {
                archive_name,
                error: "transform scheduling failed".to_string(),
            });
            continue;
        };
        let error = match handle.await {
            Ok(Ok(summary)) => {
                transformed.push(summary);
                continue;
            }
            Ok(Err(error)) => error.to_string(),
            Err(join_error) => format!("transform task failed: {join_error}"),
        };
        warn!(archive = %archive_name, error = %error, "transformation failed");
        failures.push(TransformFailure {
            archive_name,
            error,
        });
    }
    (transformed, failures)
}

fn archive_display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

async fn fold_into_index(
    index: &SourceIndex,
    partition: Partition,
    transformed: &[TransformSummary],
) -> Result<u64, SyncError> {
    let mut written = 0;
    for summary in transformed {
        let path = summary.table_path.clone();
        let table = tokio::task::spawn_blocking(move || RecordTable::read(&path))
            .await
            .map_err(IndexError::from)?
            .map_err(IndexError::from)?;
        let entries = entries_for_table(partition, &table);
        written += index.insert_entries(&entries).await?;
        debug!(archive = %summary.archive_name, entries = entries.len(), "archive indexed");
    }
    Ok(written)
}

struct Selection {
    listed: usize,
    in_window: usize,
    selected: Vec<RemoteFileEntry>,
}

async fn select(source: &dyn RemoteSource, options: &SyncOptions) -> Result<Selection, SyncError> {
    if let Some(window) = &options.window {
        parse_day_month_year(&window.from)?;
        parse_day_month_year(&window.to)?;
    }

    let catalog = match options.listing {
        ListingMode::PerFile => list_files(source, &options.remote_dir).await?,
        ListingMode::DetailListing => {
            list_files_with_size_and_date(source, &options.remote_dir).await?
        }
    };
    let listed = catalog.len();

    let in_window = match &options.window {
        Some(window) => select_by_date_range(&catalog, &window.from, &window.to)?,
        None => catalog,
    };

    let selected = if options.override_existing {
        in_window.clone()
    } else {
        let materialized =
            materialized_archives(&options.output_dir).map_err(|source| SyncError::Io {
                path: options.output_dir.clone(),
                source,
            })?;
        select_unprocessed(&in_window, &materialized)
    };

    Ok(Selection {
        listed,
        in_window: in_window.len(),
        selected,
    })
}

/// Archives a run would fetch, without fetching anything.
///
/// # Errors
///
/// Same catalog, window and directory errors as [`Synchronizer::run`].
pub async fn plan(
    source: &dyn RemoteSource,
    options: &SyncOptions,
) -> Result<Vec<RemoteFileEntry>, SyncError> {
    Ok(select(source, options).await?.selected)
}
