//! Timeout sweeper behaviour.

use taskhub_core::TaskStatus;
use taskhub_market::{CompletionReport, SweepPhase, VerifyDecision};
use taskhub_test_utils::fixtures::TestMarket;

const BATCH: i64 = 100;

fn delivery() -> CompletionReport {
    CompletionReport {
        delivery_summary: Some("delivered".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_executor_timeout_refunds_creator() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let worker = m.agent("worker", 0).await;
    let task = m.post(&creator, 10, 2).await;
    m.market.claim_task(task.id, worker.id).await.unwrap();

    m.advance_hours(1);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.executor_timeout, 0);

    m.advance_hours(2);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.executor_timeout, 1);
    assert_eq!(report.refunded, 1);
    assert!(report.errors.is_empty());

    assert_eq!(m.task(task.id).await.status, TaskStatus::Refunded);
    let creator = m.reload(creator.id).await;
    assert_eq!(creator.balance.points, 110);
    assert_eq!(creator.balance.frozen_points, 0);
    assert!(m.market.audit_ledger(creator.id).await.unwrap().consistent);
    let worker = m.reload(worker.id).await;
    assert_eq!(worker.total_tasks, 0);
    assert_eq!(worker.balance.points, 0);

    let logs = m.market.get_task(task.id).await.unwrap().logs;
    assert_eq!(
        logs.last().unwrap().message.as_deref(),
        Some("executor timeout, refunded")
    );
}

#[tokio::test]
async fn test_pending_tasks_are_not_expired() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let task = m.post(&creator, 10, 1).await;

    m.advance_hours(48);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.executor_timeout, 0);
    assert_eq!(m.task(task.id).await.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_verifier_timeout_auto_passes_after_grace() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let worker = m.agent("worker", 0).await;
    let task = m.post(&creator, 10, 48).await;
    m.market.claim_task(task.id, worker.id).await.unwrap();
    m.market.complete_task(task.id, worker.id, delivery()).await.unwrap();

    m.advance_hours(23);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.verifier_timeout, 0);

    m.advance_hours(2);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.verifier_timeout, 1);
    assert_eq!(report.auto_passed, 1);

    let task = m.task(task.id).await;
    assert_eq!(task.status, TaskStatus::Done);
    assert!(task.verified_at.is_some());
    let creator = m.reload(creator.id).await;
    let worker = m.reload(worker.id).await;
    assert_eq!(creator.balance.points, 90);
    assert_eq!(creator.balance.frozen_points, 0);
    assert_eq!(worker.balance.points, 10);
    assert_eq!(worker.success_tasks, 1);
    assert_eq!(creator.success_tasks, 1);
}

#[tokio::test]
async fn test_partial_failure_is_reported_and_isolated() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let workers = [
        m.agent("w1", 0).await,
        m.agent("w2", 0).await,
        m.agent("w3", 0).await,
    ];
    let mut tasks = Vec::new();
    for w in &workers {
        let t = m.post(&creator, 10, 1).await;
        m.market.claim_task(t.id, w.id).await.unwrap();
        tasks.push(t);
    }
    m.store.fail_task_writes(tasks[1].id).await;

    m.advance_hours(2);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.executor_timeout, 3);
    assert_eq!(report.refunded, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].task_id, tasks[1].id);
    assert_eq!(report.errors[0].phase, SweepPhase::ExecutorTimeout);

    assert_eq!(m.task(tasks[0].id).await.status, TaskStatus::Refunded);
    assert_eq!(m.task(tasks[1].id).await.status, TaskStatus::Claimed);
    assert_eq!(m.task(tasks[2].id).await.status, TaskStatus::Refunded);
    let creator = m.reload(creator.id).await;
    assert_eq!(creator.balance.frozen_points, 10);

    m.store.clear_failures().await;
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.refunded, 1);
    assert_eq!(m.reload(creator.id).await.balance.frozen_points, 0);
}

#[tokio::test]
async fn test_verified_task_is_not_auto_passed_again() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let worker = m.agent("worker", 0).await;
    let task = m.post(&creator, 10, 48).await;
    m.market.claim_task(task.id, worker.id).await.unwrap();
    m.market.complete_task(task.id, worker.id, delivery()).await.unwrap();
    let reject = VerifyDecision {
        approved: Some(false),
        reason: None,
    };
    m.market.verify_task(task.id, creator.id, reject).await.unwrap();

    m.advance_hours(30);
    let report = m.market.sweep_timeouts(BATCH).await.unwrap();
    assert_eq!(report.verifier_timeout, 0);
    assert_eq!(m.reload(worker.id).await.balance.points, 0);
}

#[tokio::test]
async fn test_batch_size_limits_each_pass() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    for i in 0..3 {
        let w = m.agent(&format!("w{i}"), 0).await;
        let t = m.post(&creator, 5, 1).await;
        m.market.claim_task(t.id, w.id).await.unwrap();
    }
    m.advance_hours(2);

    let report = m.market.sweep_timeouts(2).await.unwrap();
    assert_eq!(report.refunded, 2);
    let report = m.market.sweep_timeouts(2).await.unwrap();
    assert_eq!(report.refunded, 1);
}

#[tokio::test]
async fn test_failing_task_does_not_starve_small_batches() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let w1 = m.agent("w1", 0).await;
    let w2 = m.agent("w2", 0).await;
    // `stuck` has the earlier deadline, so it is listed first every time.
    let stuck = m.post(&creator, 10, 1).await;
    let next = m.post(&creator, 20, 2).await;
    m.market.claim_task(stuck.id, w1.id).await.unwrap();
    m.market.claim_task(next.id, w2.id).await.unwrap();
    m.store.fail_task_writes(stuck.id).await;

    m.advance_hours(3);
    let report = m.market.sweep_timeouts(1).await.unwrap();
    assert_eq!(report.executor_timeout, 2);
    assert_eq!(report.refunded, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].task_id, stuck.id);

    assert_eq!(m.task(next.id).await.status, TaskStatus::Refunded);
    assert_eq!(m.task(stuck.id).await.status, TaskStatus::Claimed);

    // Only the failing task is left; the pass ends instead of looping on it.
    let report = m.market.sweep_timeouts(1).await.unwrap();
    assert_eq!(report.executor_timeout, 1);
    assert_eq!(report.refunded, 0);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_failing_task_does_not_starve_verifier_pass() {
    let m = TestMarket::new();
    let creator = m.agent("creator", 100).await;
    let w1 = m.agent("w1", 0).await;
    let w2 = m.agent("w2", 0).await;
    let stuck = m.post(&creator, 10, 48).await;
    let next = m.post(&creator, 20, 48).await;
    m.market.claim_task(stuck.id, w1.id).await.unwrap();
    m.market.complete_task(stuck.id, w1.id, delivery()).await.unwrap();
    m.advance_hours(1);
    m.market.claim_task(next.id, w2.id).await.unwrap();
    m.market.complete_task(next.id, w2.id, delivery()).await.unwrap();
    m.store.fail_task_writes(stuck.id).await;

    m.advance_hours(25);
    let report = m.market.sweep_timeouts(1).await.unwrap();
    assert_eq!(report.verifier_timeout, 2);
    assert_eq!(report.auto_passed, 1);
    assert_eq!(report.errors[0].phase, SweepPhase::VerifierTimeout);
    assert_eq!(m.task(next.id).await.status, TaskStatus::Done);
    assert_eq!(m.reload(w2.id).await.balance.points, 20);
}
