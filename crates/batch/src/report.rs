//! What a run produced and how it went.

use crate::error::Result;
use std::fmt::{self, Display};
use std::time::Duration;

/// Running totals at the moment a batch was reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Batches reported so far, including this one.
    pub done: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// The outcome of one batch, reported in batch order.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// Zero-based position of the batch in the run.
    pub index: usize,
    /// Number of work items in the batch.
    pub items: usize,
    /// The extractor's result. `Err` marks the batch as failed; its items
    /// contribute nothing to the combined result.
    pub result: Result<R>,
    /// How long the extractor took.
    pub duration: Duration,
    pub progress: Progress,
}
impl<R> BatchOutcome<R> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// End-of-run counts, always available whether all, some or no batches
/// succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub label: String,
    pub total_items: usize,
    pub total_batches: usize,
    pub succeeded: usize,
    /// Zero-based indices of failed batches, ascending.
    pub failed: Vec<usize>,
    /// Batches never started because the run was cancelled.
    pub skipped: usize,
    /// Rows in the combined result.
    pub rows: usize,
    pub duration: Duration,
}
impl BatchSummary {
    pub fn new(label: impl Into<String>, total_items: usize, total_batches: usize) -> Self {
        Self { label: label.into(), total_items, total_batches, ..Default::default() }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Fraction of batches that completed without failure, `0.0..=1.0`.
    ///
    /// An empty run has nothing to fail and counts as a full success.
    /// Batches skipped by cancellation count against the rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_batches == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total_batches as f64
    }

    /// Returns `true` if every batch ran, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}
impl Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} batches succeeded ({:.1}% success rate), {} failed",
            self.label,
            self.succeeded,
            self.total_batches,
            self.success_rate() * 100.0,
            self.failed_count()
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        write!(f, "; {} rows in {:.1}s", self.rows, self.duration.as_secs_f64())?;
        if !self.failed.is_empty() {
            write!(f, "; failed batches: {:?}", self.failed)?;
        }
        Ok(())
    }
}

/// The combined result of a run together with its summary.
#[derive(Debug)]
pub struct BatchReport<R> {
    /// Successful batch results concatenated in batch order. Empty, not an
    /// error, when every batch failed.
    pub result: R,
    pub summary: BatchSummary,
}
