//! Index entries and the partition-precedence resolution over them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;

use crate::transform::RecordTable;

/// Which corpus tree an archive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// The yearly full snapshot.
    Baseline,
    /// The daily incremental files; they supersede the baseline.
    Update,
}

impl Partition {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Update => "update",
        }
    }

    /// Remote directory of this partition on the corpus server.
    #[must_use]
    pub fn remote_dir(&self) -> &'static str {
        match self {
            Self::Baseline => "/pubmed/baseline/",
            Self::Update => "/pubmed/updatefiles/",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Self::Baseline),
            "update" => Ok(Self::Update),
            _ => Err(format!("invalid partition: {s}")),
        }
    }
}

/// One `(record, archive)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record identifier.
    pub record_id: String,
    /// Publication date of the record, when known.
    pub publication_date: Option<NaiveDate>,
    /// Partition of the archive.
    pub partition: Partition,
    /// Archive file name.
    pub source_file: String,
}

/// Archives holding the requested records, split by partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Baseline archives, for ids with no update entry.
    pub baseline: Vec<String>,
    /// Update archives.
    pub update: Vec<String>,
}

impl Resolution {
    /// Whether nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty() && self.update.is_empty()
    }
}

/// Entries for one partition's table; records without an id are skipped and
/// repeated ids within the table collapse to one entry.
#[must_use]
pub fn entries_for_table(partition: Partition, table: &RecordTable) -> Vec<IndexEntry> {
    let mut seen = HashSet::new();
    table
        .rows
        .iter()
        .filter_map(|record| {
            let id = record.id.as_ref()?;
            seen.insert(id.as_str()).then(|| IndexEntry {
                record_id: id.clone(),
                publication_date: record.publication_date,
                partition,
                source_file: table.source_file.clone(),
            })
        })
        .collect()
}

/// Builds index entries across both partitions: one per
/// `(record_id, source_file)` pair, tagged with its partition.
#[must_use]
pub fn build(partitioned: &[(Partition, Vec<RecordTable>)]) -> Vec<IndexEntry> {
    partitioned
        .iter()
        .flat_map(|(partition, tables)| {
            tables
                .iter()
                .flat_map(move |table| entries_for_table(*partition, table))
        })
        .collect()
}

/// Resolves record ids to archives with update-over-baseline precedence.
///
/// For each id, update entries win and its baseline entries are ignored;
/// ids without update entries contribute their baseline archives. Each list
/// is deduplicated in first-seen order.
#[must_use]
pub fn resolve<S: AsRef<str>>(record_ids: &[S], index: &[IndexEntry]) -> Resolution {
    let mut by_id: HashMap<&str, Vec<&IndexEntry>> = HashMap::new();
    for entry in index {
        by_id.entry(entry.record_id.as_str()).or_default().push(entry);
    }

    let mut resolution = Resolution::default();
    for id in record_ids {
        let Some(entries) = by_id.get(id.as_ref()) else {
            continue;
        };
        let has_update = entries.iter().any(|e| e.partition == Partition::Update);
        let (wanted, target) = if has_update {
            (Partition::Update, &mut resolution.update)
        } else {
            (Partition::Baseline, &mut resolution.baseline)
        };
        for entry in entries.iter().filter(|e| e.partition == wanted) {
            if !target.contains(&entry.source_file) {
                target.push(entry.source_file.clone());
            }
        }
    }
    resolution
}
