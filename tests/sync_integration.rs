//! Integration tests for end-to-end synchronization runs.
//!
//! The remote tree is an in-memory `RemoteSource`; everything local runs for
//! real against a temporary directory and an in-memory index.

use std::sync::Arc;

use pubsync_core::{
    Database, DateWindow, ListingMode, Partition, SourceIndex, SyncError, SyncOptions,
    Synchronizer, plan,
};
use tempfile::TempDir;

mod support;
use support::corpus::{MemorySource, article, article_set, gzip, two_record_document, utc};

const FIRST: &str = "pubmed25n1301.xml.gz";
const SECOND: &str = "pubmed25n1302.xml.gz";

fn remote_tree() -> Arc<MemorySource> {
    let source = MemorySource::new();
    source.add_archive(FIRST, gzip(&two_record_document()), utc(2025, 9, 1));
    source.add_archive(
        SECOND,
        gzip(&article_set(&[article("2001", "Later", Some("Abstract."))])),
        utc(2025, 9, 20),
    );
    Arc::new(source)
}

fn options(dir: &TempDir) -> SyncOptions {
    let mut options = SyncOptions::new(Partition::Update, dir.path().join("update"));
    options.min_free_gb = 0;
    options.max_attempts = 2;
    options
}

async fn memory_index() -> SourceIndex {
    SourceIndex::new(Database::in_memory().await.unwrap())
}

#[tokio::test]
async fn test_run_fetches_transforms_and_indexes() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    let index = memory_index().await;
    let synchronizer = Synchronizer::new(source.clone()).with_index(index.clone());
    let options = options(&dir);

    let report = synchronizer.run(&options).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.partition, Partition::Update);
    assert_eq!(report.listed, 2);
    assert_eq!(report.in_window, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.fetch.succeeded.len(), 2);
    assert!((report.fetch.coverage() - 100.0).abs() < f64::EPSILON);
    assert_eq!(report.transformed.len(), 2);
    assert_eq!(report.indexed, 3);

    let output = &options.output_dir;
    assert!(output.join("pubmed25n1301.jsonl").exists());
    assert!(output.join("pubmed25n1302.jsonl").exists());
    assert!(!output.join(FIRST).exists(), "archive should be dropped");
    assert!(!output.join(format!("{FIRST}.md5")).exists());

    let resolution = index.resolve(&["1002", "2001"]).await.unwrap();
    assert_eq!(resolution.update, vec![FIRST, SECOND]);
    assert!(resolution.baseline.is_empty());
}

#[tokio::test]
async fn test_second_run_skips_materialized_archives() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    let synchronizer = Synchronizer::new(source.clone());
    let options = options(&dir);

    synchronizer.run(&options).await.unwrap();
    let retrievals = source.archive_retrievals();

    let report = synchronizer.run(&options).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.skipped, 2);
    assert_eq!(report.fetch.requested, 0);
    assert_eq!(report.fetch.attempts, 0);
    assert!(report.transformed.is_empty());
    assert_eq!(source.archive_retrievals(), retrievals);
}

#[tokio::test]
async fn test_override_reprocesses_everything() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    let synchronizer = Synchronizer::new(source.clone());
    let mut options = options(&dir);

    synchronizer.run(&options).await.unwrap();
    let retrievals = source.archive_retrievals();

    options.override_existing = true;
    let report = synchronizer.run(&options).await.unwrap();

    assert_eq!(report.skipped, 0);
    assert_eq!(report.transformed.len(), 2);
    assert_eq!(source.archive_retrievals(), retrievals + 2);
}

#[tokio::test]
async fn test_date_window_limits_selection() {
    let dir = TempDir::new().unwrap();
    let synchronizer = Synchronizer::new(remote_tree());
    let mut options = options(&dir);
    options.window = Some(DateWindow {
        from: "01/09/2025".to_string(),
        to: "14/09/2025".to_string(),
    });

    let report = synchronizer.run(&options).await.unwrap();

    assert_eq!(report.listed, 2);
    assert_eq!(report.in_window, 1);
    assert_eq!(report.transformed.len(), 1);
    assert_eq!(report.transformed[0].archive_name, FIRST);
}

#[tokio::test]
async fn test_invalid_window_aborts_before_fetching() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    let synchronizer = Synchronizer::new(source.clone());
    let mut options = options(&dir);
    options.window = Some(DateWindow {
        from: "2025-09-01".to_string(),
        to: "14/09/2025".to_string(),
    });

    let error = synchronizer.run(&options).await.unwrap_err();

    assert!(matches!(error, SyncError::InvalidDate(_)));
    assert_eq!(source.archive_retrievals(), 0);
}

#[tokio::test]
async fn test_checksum_mismatch_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    source.corrupt_sidecar(SECOND);
    let synchronizer = Synchronizer::new(source.clone());
    let options = options(&dir);

    let report = synchronizer.run(&options).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.fetch.failed_names(), vec![SECOND]);
    assert!((report.fetch.coverage() - 50.0).abs() < f64::EPSILON);
    assert_eq!(report.transformed.len(), 1);
    assert!(!options.output_dir.join(SECOND).exists());
    assert!(!options.output_dir.join("pubmed25n1302.jsonl").exists());
    // Both attempts retrieved the corrupt archive.
    assert_eq!(source.archive_retrievals(), 1 + 2);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    source.fail_retrievals(FIRST, 1);
    let synchronizer = Synchronizer::new(source.clone());
    let options = options(&dir);

    let report = synchronizer.run(&options).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.fetch.attempts, 2);
    assert_eq!(report.transformed.len(), 2);
}

#[tokio::test]
async fn test_undecodable_archive_is_a_transform_failure() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    source.add_archive("pubmed25n1303.xml.gz", b"not gzip at all".to_vec(), utc(2025, 9, 21));
    let synchronizer = Synchronizer::new(source.clone());
    let options = options(&dir);

    let report = synchronizer.run(&options).await.unwrap();

    assert!(report.fetch.is_complete());
    assert!(!report.is_complete());
    assert_eq!(report.transform_failures.len(), 1);
    assert_eq!(
        report.transform_failures[0].archive_name,
        "pubmed25n1303.xml.gz"
    );
    assert!(options.output_dir.join("pubmed25n1303.xml.gz").exists());
}

#[tokio::test]
async fn test_insufficient_capacity_aborts_run() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    let synchronizer = Synchronizer::new(source.clone());
    let mut options = options(&dir);
    options.min_free_gb = u64::MAX;

    let error = synchronizer.run(&options).await.unwrap_err();

    match error {
        SyncError::CapacityInsufficient {
            shortfall_bytes, ..
        } => assert!(shortfall_bytes > 0),
        other => panic!("expected capacity error, got {other:?}"),
    }
    assert_eq!(source.archive_retrievals(), 0);
}

#[tokio::test]
async fn test_detail_listing_mode() {
    let dir = TempDir::new().unwrap();
    let synchronizer = Synchronizer::new(remote_tree());
    let mut options = options(&dir);
    options.listing = ListingMode::DetailListing;

    let report = synchronizer.run(&options).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.listed, 2);
    assert_eq!(report.transformed.len(), 2);
}

#[tokio::test]
async fn test_plan_lists_without_fetching() {
    let dir = TempDir::new().unwrap();
    let source = remote_tree();
    let options = options(&dir);

    let selected = plan(source.as_ref(), &options).await.unwrap();

    let names: Vec<&str> = selected.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec![FIRST, SECOND]);
    assert_eq!(source.archive_retrievals(), 0);
}
