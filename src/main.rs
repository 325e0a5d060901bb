//! CLI entry point for the pubsync tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pubsync_core::config::{self, FileConfig};
use pubsync_core::remote::DEFAULT_FTP_PORT;
use pubsync_core::{
    Credentials, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_FREE_GB, DateWindow,
    FtpSource, HttpSource, ListingMode, Partition, RemoteSource, SourceIndex, SyncOptions,
    SyncReport, Synchronizer, build_from_dirs, plan,
};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, IndexCommand, SyncArgs};

/// Canonical corpus server.
const DEFAULT_HOST: &str = "ftp.ncbi.nlm.nih.gov";

/// Index file name under the output root when no path is configured.
const DEFAULT_INDEX_FILE: &str = "source_index.db";

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(value: ProcessExit) -> Self {
        match value {
            ProcessExit::Success => Self::SUCCESS,
            ProcessExit::Partial => Self::from(2_u8),
            ProcessExit::Failure => Self::FAILURE,
        }
    }
}

/// Maps completed and failed counts to the process exit outcome.
fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_config(args.config.as_deref())?;

    let outcome = match args.command {
        Command::Sync(sync_args) => run_sync(sync_args, &file_config).await?,
        Command::Index { command } => run_index(command, &file_config).await?,
    };
    Ok(outcome.into())
}

fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return config::load_file_config(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()));
    }
    let loaded = config::load_default_file_config().context("Failed to load default config")?;
    if let Some(path) = loaded.path.as_deref()
        && loaded.config.is_some()
    {
        info!(path = %path.display(), "using config file");
    }
    Ok(loaded.config.unwrap_or_default())
}

fn output_root(file_config: &FileConfig) -> PathBuf {
    file_config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_index_path(file_config: &FileConfig) -> PathBuf {
    file_config
        .index_path
        .clone()
        .unwrap_or_else(|| output_root(file_config).join(DEFAULT_INDEX_FILE))
}

fn build_source(args: &SyncArgs, file_config: &FileConfig) -> Result<Arc<dyn RemoteSource>> {
    let mirror = if args.host.is_some() {
        None
    } else {
        args.mirror.as_deref().or(file_config.mirror.as_deref())
    };
    if let Some(mirror) = mirror {
        let source = HttpSource::new(mirror)
            .with_context(|| format!("Invalid mirror URL '{mirror}'"))?;
        return Ok(Arc::new(source));
    }

    let host = args
        .host
        .clone()
        .or_else(|| file_config.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let credentials = match (&file_config.user, &file_config.password) {
        (None, None) => Credentials::anonymous(),
        (user, password) => Credentials::new(
            user.clone().unwrap_or_default(),
            password.clone().unwrap_or_default(),
        ),
    };
    Ok(Arc::new(FtpSource::with_credentials(
        host,
        DEFAULT_FTP_PORT,
        credentials,
    )))
}

fn sync_options(args: &SyncArgs, file_config: &FileConfig) -> SyncOptions {
    let partition = Partition::from(args.partition);
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| output_root(file_config).join(partition.as_str()));

    let mut options = SyncOptions::new(partition, output_dir);
    if let Some(remote_dir) = &args.remote_dir {
        options.remote_dir.clone_from(remote_dir);
    }
    options.window = match (&args.from, &args.to) {
        (Some(from), Some(to)) => Some(DateWindow {
            from: from.clone(),
            to: to.clone(),
        }),
        _ => None,
    };
    options.override_existing = args.override_existing;
    options.max_attempts = args
        .max_attempts
        .or(file_config.max_attempts)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    options.min_free_gb = args
        .min_free_gb
        .or(file_config.min_free_gb)
        .unwrap_or(DEFAULT_MIN_FREE_GB);
    options.concurrency = args
        .concurrency
        .map(usize::from)
        .or(file_config.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);
    options.drop_archives = !args.keep_archives && file_config.drop_archives.unwrap_or(true);
    if args.detail_listing {
        options.listing = ListingMode::DetailListing;
    }
    options
}

async fn run_sync(args: SyncArgs, file_config: &FileConfig) -> Result<ProcessExit> {
    let source = build_source(&args, file_config)?;
    let options = sync_options(&args, file_config);
    info!(
        source = %source.target(),
        partition = %options.partition,
        output_dir = %options.output_dir.display(),
        "pubsync starting"
    );

    if args.dry_run {
        let selected = plan(source.as_ref(), &options)
            .await
            .context("Failed to plan synchronization")?;
        for entry in &selected {
            println!("{}", entry.name);
        }
        info!(selected = selected.len(), "dry run complete");
        return Ok(ProcessExit::Success);
    }

    let mut synchronizer = Synchronizer::new(source);
    let index_path = args.index.clone().or_else(|| file_config.index_path.clone());
    if let Some(path) = &index_path {
        synchronizer = synchronizer.with_index(open_index(path).await?);
    }

    let report = synchronizer
        .run(&options)
        .await
        .context("Synchronization aborted")?;
    Ok(summarize(&report))
}

fn summarize(report: &SyncReport) -> ProcessExit {
    for name in report.fetch.failed_names() {
        warn!(file = %name, "archive could not be fetched");
    }
    for failure in &report.transform_failures {
        warn!(file = %failure.archive_name, error = %failure.error, "archive could not be transformed");
    }
    info!(
        partition = %report.partition,
        listed = report.listed,
        skipped = report.skipped,
        fetched = report.fetch.succeeded.len(),
        failed = report.fetch.failed.len(),
        attempts = report.fetch.attempts,
        coverage = report.fetch.coverage(),
        transformed = report.transformed.len(),
        indexed = report.indexed,
        "Synchronization complete"
    );
    determine_exit_outcome(
        report.transformed.len(),
        report.fetch.failed.len() + report.transform_failures.len(),
    )
}

async fn open_index(path: &Path) -> Result<SourceIndex> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    SourceIndex::open(path)
        .await
        .with_context(|| format!("Failed to open index '{}'", path.display()))
}

async fn run_index(command: IndexCommand, file_config: &FileConfig) -> Result<ProcessExit> {
    match command {
        IndexCommand::Build {
            baseline,
            update,
            index,
        } => {
            let path = index.unwrap_or_else(|| default_index_path(file_config));
            let entries = build_from_dirs(&baseline, &update)
                .await
                .context("Failed to read record tables")?;
            let store = open_index(&path).await?;
            let written = store.rebuild(&entries).await.context("Failed to rebuild index")?;
            store.close().await;
            info!(index = %path.display(), written, "Index rebuilt");
        }
        IndexCommand::Resolve { index, ids } => {
            let path = index.unwrap_or_else(|| default_index_path(file_config));
            let store = open_index(&path).await?;
            let resolution = store.resolve(ids.as_slice()).await.context("Failed to resolve ids")?;
            store.close().await;
            for file in &resolution.update {
                println!("update\t{file}");
            }
            for file in &resolution.baseline {
                println!("baseline\t{file}");
            }
            if resolution.is_empty() {
                info!(ids = ids.len(), "no archives hold the requested records");
            }
        }
    }
    Ok(ProcessExit::Success)
}
