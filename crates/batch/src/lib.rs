//! Failure-isolating batch execution.
//!
//! Extracting thousands of remote entities in one go holds every result in
//! memory and lets a single timeout throw away the whole run. The
//! [`BatchRunner`] instead [partitions](partition) the work items into small
//! ordered batches, hands each one to an [`Extractor`], and concatenates the
//! results of the batches that succeeded, in order:
//!
//! - peak memory is bounded by the batch size times the concurrency, not by
//!   the size of the collection;
//! - a failing batch is recorded and skipped, the rest of the run carries on;
//! - progress is reported after every batch, both as [`BatchEvent`]s and as
//!   `tracing` events, and each successful batch result is snapshotted to
//!   storage so a crashed run leaves its completed work behind.
//!
//! ```
//! use harvest_batch::{BatchRunner, RunnerOptions};
//! use harvest_batch::error::Result;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let runner = BatchRunner::new(RunnerOptions::new(10, 1), None);
//! let project_ids: Vec<u64> = (1..=25).collect();
//! let extract = |ids: Vec<u64>| async move { Result::Ok(ids) };
//! let report = runner.run(&project_ids, &extract, "projects", &CancellationToken::new()).await;
//! assert_eq!(report.result, project_ids);
//! assert_eq!(report.summary.total_batches, 3);
//! # }
//! ```

pub mod error;
mod extractor;
mod partition;
mod report;
mod runner;
mod snapshot;

pub use crate::extractor::Extractor;
pub use crate::partition::partition;
pub use crate::report::{BatchOutcome, BatchReport, BatchSummary, Progress};
pub use crate::runner::{BatchEvent, BatchRunner, DEFAULT_BATCH_SIZE, RunnerOptions};
pub use crate::snapshot::snapshot_path;
pub use tokio_util::sync::CancellationToken;
