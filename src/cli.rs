//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use pubsync_core::Partition;

/// Incrementally mirror, verify and tabulate the PubMed archive corpus.
///
/// Pubsync lists a corpus partition, fetches the archives that are new or
/// inside a date window, verifies their published checksums, turns each one
/// into a record table and keeps a record-to-archive index.
#[derive(Parser, Debug)]
#[command(name = "pubsync")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/pubsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synchronize one partition into a local directory
    Sync(SyncArgs),

    /// Build or query the record-to-archive index
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
}

/// Partition names accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionArg {
    /// Yearly full snapshot
    Baseline,
    /// Daily update files
    Update,
}

impl From<PartitionArg> for Partition {
    fn from(value: PartitionArg) -> Self {
        match value {
            PartitionArg::Baseline => Self::Baseline,
            PartitionArg::Update => Self::Update,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct SyncArgs {
    /// Partition to synchronize
    #[arg(value_enum)]
    pub partition: PartitionArg,

    /// First day of the modification window (dd/mm/yyyy)
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Last day of the modification window (dd/mm/yyyy)
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Output directory (defaults to <config output_dir>/<partition> or ./<partition>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Re-process archives whose table already exists
    #[arg(long = "override")]
    pub override_existing: bool,

    /// Fold new tables into this index database
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// FTP host of the corpus server
    #[arg(long, conflicts_with = "mirror")]
    pub host: Option<String>,

    /// HTTPS mirror base URL, used instead of FTP
    #[arg(long)]
    pub mirror: Option<String>,

    /// Remote directory (defaults to the partition's directory)
    #[arg(long)]
    pub remote_dir: Option<String>,

    /// Maximum fetch attempts per archive (1-20)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Required free space in gigabytes before fetching (0-10000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=10_000))]
    pub min_free_gb: Option<u64>,

    /// Maximum concurrent transfers (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Keep archives and checksum files after transformation
    #[arg(long)]
    pub keep_archives: bool,

    /// Read sizes and dates from one detail listing instead of per-file queries
    #[arg(long)]
    pub detail_listing: bool,

    /// List what would be fetched without fetching
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    /// Rebuild the index from the tables of both partitions
    Build {
        /// Directory holding baseline tables
        #[arg(long)]
        baseline: PathBuf,

        /// Directory holding update tables
        #[arg(long)]
        update: PathBuf,

        /// Index database file
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the archives holding the given record ids
    Resolve {
        /// Index database file
        #[arg(long)]
        index: Option<PathBuf>,

        /// Record identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },
}
