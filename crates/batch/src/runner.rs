use crate::error::{ErrorKind, Result};
use crate::extractor::Extractor;
use crate::partition::partition;
use crate::report::{BatchOutcome, BatchReport, BatchSummary, Progress};
use crate::snapshot;
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use harvest_storage::BackendHandle;
use harvest_storage::backend::LocalBackend;
use harvest_table::Tabular;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Items per batch when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Progress events emitted by [`BatchRunner::stream()`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Finished`](Self::Finished): once per started batch, in batch order
///    regardless of the order batches completed in.
/// 3. [`Cancelled`](Self::Cancelled): at most once, if the run was cancelled
///    before every batch had started.
/// 4. [`Complete`](Self::Complete): exactly once, always last.
#[derive(Debug)]
pub enum BatchEvent<R> {
    /// The items have been partitioned; no batch has run yet.
    Started { label: String, items: usize, batches: usize },
    /// One batch was reported, successfully or not.
    Finished(BatchOutcome<R>),
    /// Cancellation was seen; `remaining` batches will never start.
    Cancelled { remaining: usize },
    /// Final counts for the run.
    Complete(BatchSummary),
}

/// How a [`BatchRunner`] splits and schedules work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Work items per batch, at least one.
    pub batch_size: usize,
    /// Batches in flight or awaiting their turn to be reported, at least one.
    /// `1` runs batches strictly one after another.
    pub concurrency: usize,
}
impl RunnerOptions {
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self { batch_size: batch_size.max(1), concurrency: concurrency.max(1) }
    }
}
impl Default for RunnerOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, 1)
    }
}

/// Runs an [`Extractor`] over a large ordered collection, one bounded batch
/// at a time.
///
/// A failing batch is recorded and skipped; it never ends the run. Results of
/// successful batches are concatenated in batch order. When a snapshot
/// backend is configured every successful, non-empty batch result is also
/// written there as it is reported, so a crashed run leaves its completed
/// work behind.
pub struct BatchRunner {
    options: RunnerOptions,
    snapshots: Option<BackendHandle>,
}

impl BatchRunner {
    pub fn new(options: RunnerOptions, snapshots: Option<BackendHandle>) -> Self {
        let options = RunnerOptions::new(options.batch_size, options.concurrency);
        Self { options, snapshots }
    }

    /// Runner writing snapshots to a local directory, created if missing.
    ///
    /// # Errors
    /// [`ErrorKind::Storage`] if the directory can't be created.
    pub fn with_snapshot_dir(options: RunnerOptions, dir: impl AsRef<Path>) -> Result<Self> {
        let backend = LocalBackend::new("snapshots", dir).or_raise(|| ErrorKind::Storage)?;
        Ok(Self::new(options, Some(Arc::new(backend))))
    }

    pub fn options(&self) -> RunnerOptions {
        self.options
    }

    /// Run every batch and combine the results.
    ///
    /// Never fails: extraction errors are isolated per batch and reported in
    /// the [`BatchSummary`]. If every batch fails the result is empty.
    pub async fn run<T, R, X>(
        &self,
        items: &[T],
        extractor: &X,
        label: &str,
        cancel: &CancellationToken,
    ) -> BatchReport<R>
    where
        T: Clone,
        R: Tabular + Serialize,
        X: Extractor<T, R> + ?Sized,
    {
        let mut result = R::default();
        let mut summary = BatchSummary::new(label, items.len(), 0);
        let mut events = std::pin::pin!(self.stream(items, extractor, label, cancel));
        while let Some(event) = events.next().await {
            match event {
                BatchEvent::Finished(BatchOutcome { result: Ok(rows), .. }) => result.append(rows),
                BatchEvent::Complete(complete) => summary = complete,
                _ => {},
            }
        }
        if result.is_empty() && summary.total_batches > 0 {
            tracing::warn!(label, "No successful batches to combine");
        }
        BatchReport { result, summary }
    }

    /// Stream [`BatchEvent`]s while running every batch.
    ///
    /// At most `concurrency` batches are in flight or waiting to be reported
    /// at any moment: a batch that finishes early is held back until all
    /// batches before it have been reported, and no new batch starts while
    /// the window is full. `cancel` is checked before each batch starts;
    /// batches already running are allowed to finish.
    pub fn stream<'a, T, R, X>(
        &'a self,
        items: &'a [T],
        extractor: &'a X,
        label: &'a str,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = BatchEvent<R>> + 'a
    where
        T: Clone,
        R: Tabular + Serialize + 'a,
        X: Extractor<T, R> + ?Sized,
    {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let started_at = Instant::now();
            let batches = partition(items, self.options.batch_size);
            let total = batches.len();
            tracing::info!(label, items = items.len(), batches = total, batch_size = self.options.batch_size, "Starting batch run");
            yield BatchEvent::Started { label: label.to_string(), items: items.len(), batches: total };

            let mut summary = BatchSummary::new(label, items.len(), total);
            let mut in_flight = FuturesUnordered::new();
            let mut finished: BTreeMap<usize, BatchOutcome<R>> = BTreeMap::new();
            let mut next_to_start = 0;
            let mut next_to_report = 0;
            let mut cancelled = false;
            loop {
                while !cancelled && next_to_start < total && next_to_start < next_to_report + self.options.concurrency {
                    if cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    in_flight.push(run_batch(extractor, next_to_start, batches[next_to_start].to_vec()));
                    next_to_start += 1;
                }
                let Some(outcome) = in_flight.next().await else {
                    break;
                };
                finished.insert(outcome.index, outcome);
                // Reassemble: report everything that is now contiguous.
                while let Some(mut outcome) = finished.remove(&next_to_report) {
                    next_to_report += 1;
                    self.record(&mut summary, &mut outcome).await;
                    yield BatchEvent::Finished(outcome);
                }
            }

            if cancelled {
                summary.skipped = total - next_to_start;
                tracing::warn!(label, remaining = summary.skipped, "Batch run cancelled");
                yield BatchEvent::Cancelled { remaining: summary.skipped };
            }
            summary.duration = started_at.elapsed();
            tracing::info!(
                label,
                success_rate = %format_args!("{:.1}%", summary.success_rate() * 100.0),
                rows = summary.rows,
                "Batch processing completed"
            );
            if !summary.failed.is_empty() {
                tracing::warn!(label, failed = ?summary.failed, "Failed batches");
            }
            yield BatchEvent::Complete(summary);
        })
    }

    /// Update the summary for a batch that is about to be reported, log it
    /// and write its snapshot.
    async fn record<R: Tabular + Serialize>(&self, summary: &mut BatchSummary, outcome: &mut BatchOutcome<R>) {
        match &outcome.result {
            Ok(rows) => {
                summary.succeeded += 1;
                summary.rows += rows.len();
                if !rows.is_empty()
                    && let Some(backend) = &self.snapshots
                {
                    match snapshot::write(backend.as_ref(), outcome.index, rows).await {
                        Ok(path) => tracing::debug!(path = %path.display(), "Wrote batch snapshot"),
                        Err(e) => tracing::warn!(batch = outcome.index, error = ?e, "Could not write batch snapshot"),
                    }
                }
            },
            Err(e) => {
                summary.failed.push(outcome.index);
                tracing::warn!(label = %summary.label, batch = outcome.index, error = ?e, "Batch failed");
            },
        }
        outcome.progress = Progress {
            done: summary.succeeded + summary.failed.len(),
            total: summary.total_batches,
            succeeded: summary.succeeded,
            failed: summary.failed.len(),
        };
        tracing::info!(
            label = %summary.label,
            batch = outcome.index + 1,
            total = summary.total_batches,
            succeeded = outcome.progress.succeeded,
            failed = outcome.progress.failed,
            "Processed batch"
        );
    }

    /// Delete the snapshots written by previous runs. Returns how many were
    /// removed; without a snapshot backend there is nothing to do.
    pub async fn cleanup_snapshots(&self) -> Result<usize> {
        match &self.snapshots {
            Some(backend) => snapshot::cleanup(backend.as_ref()).await,
            None => Ok(0),
        }
    }
}

async fn run_batch<T, R, X>(extractor: &X, index: usize, batch: Vec<T>) -> BatchOutcome<R>
where
    X: Extractor<T, R> + ?Sized,
{
    let items = batch.len();
    let started_at = Instant::now();
    tracing::debug!(batch = index, items, "Starting batch");
    let result = extractor.extract(batch).await;
    BatchOutcome { index, items, result, duration: started_at.elapsed(), progress: Progress::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_storage::StorageBackend;
    use harvest_storage::backend::MockBackend;
    use harvest_table::Table;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(n: u64) -> Vec<u64> {
        (1..=n).collect()
    }

    /// One row per project id.
    async fn rows(batch: Vec<u64>) -> Result<Table> {
        Ok(batch.into_iter().fold(Table::new(["project_id"]), |t, id| t.with_row([json!(id)])))
    }

    fn project_ids(table: &Table) -> Vec<u64> {
        table.column("project_id").unwrap().map(|v| v.as_u64().unwrap()).collect()
    }

    async fn collect<R>(stream: impl Stream<Item = BatchEvent<R>>) -> Vec<BatchEvent<R>> {
        stream.collect().await
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[tokio::test]
    async fn test_all_batches_succeed(#[case] concurrency: usize) {
        let runner = BatchRunner::new(RunnerOptions::new(10, concurrency), None);
        let report = runner.run(&ids(25), &rows, "projects", &CancellationToken::new()).await;
        assert_eq!(project_ids(&report.result), ids(25));
        assert_eq!(report.summary.total_batches, 3);
        assert_eq!(report.summary.succeeded, 3);
        assert!(report.summary.failed.is_empty());
        assert_eq!(report.summary.rows, 25);
        assert_eq!(report.summary.success_rate(), 1.0);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[tokio::test]
    async fn test_failed_batch_is_isolated(#[case] concurrency: usize) {
        let runner = BatchRunner::new(RunnerOptions::new(10, concurrency), None);
        let extractor = |batch: Vec<u64>| async move {
            if batch.contains(&15) {
                exn::bail!(ErrorKind::Extraction);
            }
            rows(batch).await
        };
        let report = runner.run(&ids(25), &extractor, "projects", &CancellationToken::new()).await;

        let expected: Vec<u64> = (1..=10).chain(21..=25).collect();
        assert_eq!(project_ids(&report.result), expected);
        assert_eq!(report.summary.failed, vec![1]);
        assert_eq!(report.summary.failed_count(), 1);
        assert!((report.summary.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_batches_fail() {
        let runner = BatchRunner::new(RunnerOptions::new(5, 1), None);
        let extractor = |_: Vec<u64>| async { Result::<Table>::Err(exn::Exn::from(ErrorKind::Extraction)) };
        let report = runner.run(&ids(12), &extractor, "projects", &CancellationToken::new()).await;
        assert!(report.result.is_empty());
        assert_eq!(report.summary.failed, vec![0, 1, 2]);
        assert_eq!(report.summary.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let runner = BatchRunner::new(RunnerOptions::default(), None);
        let calls = AtomicUsize::new(0);
        let extractor = |batch: Vec<u64>| {
            calls.fetch_add(1, Ordering::SeqCst);
            rows(batch)
        };
        let items: Vec<u64> = Vec::new();
        let events = collect(runner.stream(&items, &extractor, "nothing", &CancellationToken::new())).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], BatchEvent::Started { batches: 0, .. }));
        let BatchEvent::Complete(summary) = &events[1] else {
            panic!("expected Complete");
        };
        assert_eq!(summary.success_rate(), 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_event_order_and_progress() {
        let runner = BatchRunner::new(RunnerOptions::new(2, 1), None);
        let extractor = |batch: Vec<u64>| async move {
            if batch.contains(&3) {
                exn::bail!(ErrorKind::Extraction);
            }
            rows(batch).await
        };
        let events = collect(runner.stream(&ids(5), &extractor, "commits", &CancellationToken::new())).await;
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], BatchEvent::Started { items: 5, batches: 3, .. }));
        let progress: Vec<(usize, Progress)> = events[1..4]
            .iter()
            .map(|e| match e {
                BatchEvent::Finished(outcome) => (outcome.index, outcome.progress),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(
            progress,
            vec![
                (0, Progress { done: 1, total: 3, succeeded: 1, failed: 0 }),
                (1, Progress { done: 2, total: 3, succeeded: 1, failed: 1 }),
                (2, Progress { done: 3, total: 3, succeeded: 2, failed: 1 }),
            ]
        );
        assert!(matches!(&events[4], BatchEvent::Complete(s) if s.failed == vec![1]));
    }

    #[tokio::test]
    async fn test_out_of_order_completion_is_reported_in_order() {
        let runner = BatchRunner::new(RunnerOptions::new(1, 4), None);
        // Earlier batches take longer, so they finish last.
        let extractor = |batch: Vec<u64>| async move {
            tokio::time::sleep(Duration::from_millis(10 * (5 - batch[0]))).await;
            rows(batch).await
        };
        let events = collect(runner.stream(&ids(4), &extractor, "projects", &CancellationToken::new())).await;
        let order: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Finished(outcome) => Some(outcome.index),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    #[tokio::test]
    async fn test_concurrency_is_bounded(#[case] concurrency: usize) {
        let runner = BatchRunner::new(RunnerOptions::new(1, concurrency), None);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let extractor = |batch: Vec<u64>| {
            let active = &active;
            let peak = &peak;
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                rows(batch).await
            }
        };
        let report = runner.run(&ids(12), &extractor, "projects", &CancellationToken::new()).await;
        assert_eq!(report.summary.succeeded, 12);
        assert!(peak.load(Ordering::SeqCst) <= concurrency);
    }

    #[tokio::test]
    async fn test_cancellation_skips_unstarted_batches() {
        let runner = BatchRunner::new(RunnerOptions::new(10, 1), None);
        let cancel = CancellationToken::new();
        let extractor = |batch: Vec<u64>| {
            let cancel = cancel.clone();
            async move {
                // Cancel while the first batch is running; it still completes.
                cancel.cancel();
                rows(batch).await
            }
        };
        let events = collect(runner.stream(&ids(25), &extractor, "projects", &cancel)).await;
        assert!(matches!(&events[1], BatchEvent::Finished(outcome) if outcome.is_success()));
        assert!(matches!(&events[2], BatchEvent::Cancelled { remaining: 2 }));
        let BatchEvent::Complete(summary) = &events[3] else {
            panic!("expected Complete");
        };
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 2);
        assert!((summary.success_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let runner = BatchRunner::new(RunnerOptions::new(10, 1), None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = runner.run(&ids(25), &rows, "projects", &cancel).await;
        assert!(report.result.is_empty());
        assert_eq!(report.summary.skipped, 3);
        assert!(!report.summary.is_complete());
    }

    #[tokio::test]
    async fn test_snapshots() {
        let backend = Arc::new(MockBackend::default());
        let runner = BatchRunner::new(RunnerOptions::new(10, 2), Some(backend.clone()));
        let extractor = |batch: Vec<u64>| async move {
            match batch[0] {
                11 => exn::bail!(ErrorKind::Extraction),
                // Succeeds with nothing to show
                21 => Ok(Table::new(["project_id"])),
                _ => rows(batch).await,
            }
        };
        runner.run(&ids(25), &extractor, "projects", &CancellationToken::new()).await;

        let snapshot: Table = serde_json::from_slice(&backend.read(Path::new("batch_000.json")).await.unwrap()).unwrap();
        assert_eq!(project_ids(&snapshot), ids(10));
        assert!(!backend.exists(Path::new("batch_001.json")).await.unwrap());
        assert!(!backend.exists(Path::new("batch_002.json")).await.unwrap());

        assert_eq!(runner.cleanup_snapshots().await.unwrap(), 1);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_fail_batch() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_on("batch_000.json").await;
        let runner = BatchRunner::new(RunnerOptions::new(10, 1), Some(backend.clone()));
        let report = runner.run(&ids(15), &rows, "projects", &CancellationToken::new()).await;
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.result.len(), 15);
        assert!(backend.exists(Path::new("batch_001.json")).await.unwrap());
    }

    #[tokio::test]
    async fn test_with_snapshot_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("temp_batches");
        let runner = BatchRunner::with_snapshot_dir(RunnerOptions::new(10, 1), &dir).unwrap();
        runner.run(&ids(12), &rows, "projects", &CancellationToken::new()).await;
        assert!(dir.join("batch_000.json").is_file());
        assert!(dir.join("batch_001.json").is_file());
        assert_eq!(runner.cleanup_snapshots().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_vec_results() {
        let runner = BatchRunner::new(RunnerOptions::new(3, 2), None);
        let seen = Mutex::new(Vec::new());
        let extractor = |batch: Vec<u64>| {
            seen.lock().unwrap().push(batch.clone());
            async move { Result::Ok(batch.into_iter().map(|id| id * 10).collect::<Vec<_>>()) }
        };
        let report = runner.run(&ids(7), &extractor, "ids", &CancellationToken::new()).await;
        assert_eq!(report.result, vec![10, 20, 30, 40, 50, 60, 70]);
        assert_eq!(seen.lock().unwrap().concat(), ids(7));
    }

    #[test]
    fn test_options_are_at_least_one() {
        assert_eq!(RunnerOptions::new(0, 0), RunnerOptions { batch_size: 1, concurrency: 1 });
        let runner = BatchRunner::new(RunnerOptions { batch_size: 0, concurrency: 0 }, None);
        assert_eq!(runner.options(), RunnerOptions { batch_size: 1, concurrency: 1 });
    }
}
