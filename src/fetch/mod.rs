//! Retrying, checksum-verified bulk fetching.
//!
//! # Architecture
//!
//! - [`FetchEngine`] - attempt loop with per-attempt bounded concurrency
//! - [`BatchProgress`] - the narrowing work list folded over attempts
//! - [`BatchReport`] - verified files, permanent failures and coverage
//! - [`compute_md5`] / [`parse_published_checksum`] - sidecar verification

mod checksum;
mod engine;
mod outcome;

pub use checksum::{compute_md5, parse_published_checksum};
pub use engine::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, EngineError, FetchEngine, fetch_batch};
pub use outcome::{BatchProgress, BatchReport, FetchOutcome, FetchStatus};
