use futures::StreamExt;
use harvest_batch::error::{ErrorKind, Result};
use harvest_batch::{BatchEvent, BatchRunner, CancellationToken, RunnerOptions, partition};
use harvest_table::Table;
use serde_json::json;

async fn extract(ids: Vec<u64>) -> Result<Table> {
    if ids.contains(&15) {
        exn::bail!(ErrorKind::Extraction);
    }
    Ok(ids.into_iter().fold(Table::new(["project_id", "name"]), |table, id| {
        table.with_row([json!(id), json!(format!("project-{id}"))])
    }))
}

#[test]
fn twenty_five_items_make_three_batches() {
    let items: Vec<u64> = (1..=25).collect();
    let batches = partition(&items, 10);
    assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![10, 10, 5]);
    assert_eq!(batches.concat(), items);
}

#[tokio::test]
async fn second_batch_failing_keeps_the_rest() {
    let items: Vec<u64> = (1..=25).collect();
    let temp_dir = tempfile::tempdir().unwrap();
    let runner = BatchRunner::with_snapshot_dir(RunnerOptions::new(10, 1), temp_dir.path()).unwrap();

    let report = runner.run(&items, &extract, "GitLab projects", &CancellationToken::new()).await;

    let ids: Vec<u64> = report.result.column("project_id").unwrap().map(|v| v.as_u64().unwrap()).collect();
    assert_eq!(ids, (1..=10).chain(21..=25).collect::<Vec<_>>());
    assert_eq!(report.summary.failed, vec![1]);
    assert_eq!(report.summary.failed_count(), 1);
    assert_eq!(format!("{:.1}", report.summary.success_rate() * 100.0), "66.7");
    assert!(temp_dir.path().join("batch_000.json").is_file());
    assert!(!temp_dir.path().join("batch_001.json").exists());
    assert!(temp_dir.path().join("batch_002.json").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_run_matches_sequential_run() {
    let items: Vec<u64> = (1..=95).collect();
    let sequential = BatchRunner::new(RunnerOptions::new(10, 1), None);
    let concurrent = BatchRunner::new(RunnerOptions::new(10, 4), None);
    let cancel = CancellationToken::new();

    let a = sequential.run(&items, &extract, "sequential", &cancel).await;
    let b = concurrent.run(&items, &extract, "concurrent", &cancel).await;
    assert_eq!(a.result, b.result);
    assert_eq!(a.summary.failed, b.summary.failed);

    let finished: Vec<usize> = concurrent
        .stream(&items, &extract, "concurrent", &cancel)
        .filter_map(|event| async move {
            match event {
                BatchEvent::Finished(outcome) => Some(outcome.index),
                _ => None,
            }
        })
        .collect()
        .await;
    assert_eq!(finished, (0..10).collect::<Vec<_>>());
}
