//! Background sweeper over the in-memory store.

use std::time::Duration;

use taskhub_api::jobs::{run_once, timeout_sweep_task, TimeoutSweepConfig, TimeoutSweepMetrics};
use taskhub_core::TaskStatus;
use taskhub_test_utils::fixtures::TestMarket;
use tokio::sync::watch;

#[tokio::test]
async fn test_run_once_counts_refunds() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 50).await;
    let worker = m.agent("worker", 0).await;
    let task = m.post(&creator, 10, 1).await;
    m.market.claim_task(task.id, worker.id).await.unwrap();
    m.advance_hours(3);

    let metrics = TimeoutSweepMetrics::new();
    run_once(&m.market, 100, &metrics).await;
    run_once(&m.market, 100, &metrics).await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.runs, 2);
    assert_eq!(snapshot.refunded, 1);
    assert_eq!(snapshot.errors, 0);
    assert_eq!(m.task(task.id).await.status, TaskStatus::Refunded);
}

#[tokio::test]
async fn test_task_stops_on_shutdown() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 50).await;
    let worker = m.agent("worker", 0).await;
    let task = m.post(&creator, 10, 1).await;
    m.market.claim_task(task.id, worker.id).await.unwrap();
    m.market
        .complete_task(
            task.id,
            worker.id,
            taskhub_market::CompletionReport {
                delivery_summary: Some("done".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    m.advance_hours(25);

    let config = TimeoutSweepConfig {
        enabled: true,
        check_interval: Duration::from_millis(10),
        batch_size: 10,
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(timeout_sweep_task(m.market.clone(), config, shutdown_rx));

    // The first tick fires immediately.
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    let metrics = handle.await.unwrap();

    let snapshot = metrics.snapshot();
    assert!(snapshot.runs >= 1);
    assert_eq!(snapshot.auto_passed, 1);
    assert_eq!(m.task(task.id).await.status, TaskStatus::Verified);
}
