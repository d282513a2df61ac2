//! Randomized marketplace scripts: whatever sequence of operations runs,
//! balances stay non-negative, escrow matches open tasks, points only grow
//! through full refunds, and every agent's point log replays to their
//! available balance.

use proptest::prelude::*;
use taskhub_core::{TaskId, TaskStatus};
use taskhub_market::{CompletionReport, ProgressReport, VerifyDecision};
use taskhub_test_utils::assertions::{
    assert_escrow_conserved, assert_no_negative_balances, assert_one_active_task_per_executor,
};
use taskhub_test_utils::fixtures::{draft, TestMarket};
use taskhub_test_utils::generators::{arb_market_step, MarketStep};

const AGENTS: usize = 4;

async fn run_script(steps: Vec<MarketStep>, starting_points: Vec<i64>) {
    let m = TestMarket::new();
    let mut agents = Vec::new();
    for (i, points) in starting_points.iter().enumerate() {
        agents.push(m.agent(&format!("agent-{i}"), *points).await);
    }
    let mut tasks: Vec<TaskId> = Vec::new();
    let pick = |tasks: &Vec<TaskId>, i: usize| tasks.get(i % tasks.len().max(1)).copied();

    for step in steps {
        // Errors are expected for many random steps; only invariants matter.
        match step {
            MarketStep::Create { creator, points } => {
                let creator = &agents[creator % AGENTS];
                if let Ok(task) = m.market.create_task(creator.id, draft("p", points, 4)).await {
                    tasks.push(task.id);
                }
            }
            MarketStep::Claim { task, executor } => {
                if let Some(id) = pick(&tasks, task) {
                    let _ = m.market.claim_task(id, agents[executor % AGENTS].id).await;
                }
            }
            MarketStep::Progress { task } => {
                if let Some(id) = pick(&tasks, task) {
                    if let Some(executor) = m.task(id).await.executor_id {
                        let report = ProgressReport {
                            progress: Some(50),
                            status: Some("EXECUTING".into()),
                            ..Default::default()
                        };
                        let _ = m.market.report_progress(id, executor, report).await;
                    }
                }
            }
            MarketStep::Complete { task } => {
                if let Some(id) = pick(&tasks, task) {
                    if let Some(executor) = m.task(id).await.executor_id {
                        let report = CompletionReport {
                            delivery_summary: Some("done".into()),
                            ..Default::default()
                        };
                        let _ = m.market.complete_task(id, executor, report).await;
                    }
                }
            }
            MarketStep::Verify { task, approved } => {
                if let Some(id) = pick(&tasks, task) {
                    let creator = m.task(id).await.creator_id;
                    let decision = VerifyDecision {
                        approved: Some(approved),
                        reason: None,
                    };
                    let _ = m.market.verify_task(id, creator, decision).await;
                }
            }
            MarketStep::Cancel { task } => {
                if let Some(id) = pick(&tasks, task) {
                    let creator = m.task(id).await.creator_id;
                    let _ = m.market.cancel_task(id, creator).await;
                }
            }
            MarketStep::AdvanceHours(hours) => m.advance_hours(hours),
            MarketStep::Sweep => {
                let report = m.market.sweep_timeouts(100).await.unwrap();
                assert!(report.errors.is_empty(), "{:?}", report.errors);
            }
        }

        let all_agents = m.store.all_agents().await;
        let all_tasks = m.store.all_tasks().await;
        assert_no_negative_balances(&all_agents);
        assert_escrow_conserved(&all_agents, &all_tasks);
        assert_one_active_task_per_executor(&all_tasks);
    }

    // Only full refunds (cancellation, executor timeout) add points; a
    // rejection unfreezes without crediting.
    let all_tasks = m.store.all_tasks().await;
    let refunded: i64 = all_tasks
        .iter()
        .filter(|t| {
            t.status == TaskStatus::Cancelled
                || (t.status == TaskStatus::Refunded && t.verified_at.is_none())
        })
        .map(|t| t.points)
        .sum();
    let total_before: i64 = starting_points.iter().sum();
    let all_agents = m.store.all_agents().await;
    let total_after: i64 = all_agents.iter().map(|a| a.balance.points).sum();
    assert_eq!(
        total_before + refunded,
        total_after,
        "points changed outside of full refunds"
    );

    for agent in &agents {
        let audit = m.market.audit_ledger(agent.id).await.unwrap();
        assert!(audit.consistent, "{:?}", audit);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ledger_reconciles_and_escrow_is_conserved(
        steps in prop::collection::vec(arb_market_step(), 1..60),
        starting_points in prop::collection::vec(0i64..120, AGENTS),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(run_script(steps, starting_points));
    }
}
