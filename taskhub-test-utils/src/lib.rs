//! TaskHub Test Utilities
//!
//! Shared test infrastructure for the TaskHub workspace:
//! - Proptest generators for domain values
//! - A market fixture over the in-memory store with a manual clock
//! - Assertions for marketplace-wide invariants

pub use taskhub_core::{
    hash_api_key, Agent, AgentId, Balance, ManualClock, MarketError, MarketResult, Task,
    TaskDraft, TaskId, TaskStatus,
};
pub use taskhub_market::Market;
pub use taskhub_storage::{MarketStore, MemoryStore};

use std::sync::Arc;

use chrono::Duration;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_task_points() -> impl Strategy<Value = i64> {
        1i64..=50
    }

    pub fn arb_timeout_hours() -> impl Strategy<Value = i64> {
        1i64..=72
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop::sample::select(TaskStatus::ALL.to_vec())
    }

    /// A step in a randomized marketplace script. Indices are taken modulo
    /// the number of agents / tasks that exist when the step runs.
    #[derive(Debug, Clone)]
    pub enum MarketStep {
        Create { creator: usize, points: i64 },
        Claim { task: usize, executor: usize },
        Progress { task: usize },
        Complete { task: usize },
        Verify { task: usize, approved: bool },
        Cancel { task: usize },
        AdvanceHours(i64),
        Sweep,
    }

    pub fn arb_market_step() -> impl Strategy<Value = MarketStep> {
        prop_oneof![
            3 => (0usize..8, 1i64..=60).prop_map(|(creator, points)| MarketStep::Create { creator, points }),
            3 => (0usize..16, 0usize..8).prop_map(|(task, executor)| MarketStep::Claim { task, executor }),
            1 => (0usize..16).prop_map(|task| MarketStep::Progress { task }),
            2 => (0usize..16).prop_map(|task| MarketStep::Complete { task }),
            2 => (0usize..16, any::<bool>()).prop_map(|(task, approved)| MarketStep::Verify { task, approved }),
            1 => (0usize..16).prop_map(|task| MarketStep::Cancel { task }),
            1 => (1i64..=30).prop_map(MarketStep::AdvanceHours),
            1 => Just(MarketStep::Sweep),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built market for scenario tests.

    use super::*;

    /// Draft with the given reward and execution budget.
    pub fn draft(title: &str, points: i64, timeout_hours: i64) -> TaskDraft {
        TaskDraft {
            title: Some(title.to_string()),
            description: Some(format!("{} (fixture)", title)),
            points: Some(points),
            timeout_hours: Some(timeout_hours),
        }
    }

    /// API key the fixture assigns to an agent named `name`.
    pub fn api_key_for(name: &str) -> String {
        format!("test-key-{}", name)
    }

    /// A market over a fresh in-memory store and a manual clock.
    pub struct TestMarket {
        pub market: Market,
        pub store: MemoryStore,
        pub clock: Arc<ManualClock>,
    }

    impl TestMarket {
        pub fn new() -> Self {
            let store = MemoryStore::new();
            let clock = Arc::new(ManualClock::default());
            let market = Market::new(Arc::new(store.clone()), clock.clone());
            Self {
                market,
                store,
                clock,
            }
        }

        /// Seed an agent holding `points`, authenticating with [`api_key_for`].
        pub async fn agent(&self, name: &str, points: i64) -> Agent {
            let agent = Agent::new(
                name.to_string(),
                None,
                hash_api_key(&api_key_for(name)),
                taskhub_core::Clock::now(self.clock.as_ref()),
            );
            match self.store.seed_agent(agent, points).await {
                Ok(agent) => agent,
                Err(err) => panic!("seeding agent {} failed: {}", name, err),
            }
        }

        /// Current stored state of an agent.
        pub async fn reload(&self, id: AgentId) -> Agent {
            match self.store.agent_get(id).await {
                Ok(Some(agent)) => agent,
                other => panic!("agent {} not loadable: {:?}", id, other),
            }
        }

        pub async fn task(&self, id: TaskId) -> Task {
            match self.store.task_get(id).await {
                Ok(Some(task)) => task,
                other => panic!("task {} not loadable: {:?}", id, other),
            }
        }

        /// Post a task and panic on failure.
        pub async fn post(&self, creator: &Agent, points: i64, timeout_hours: i64) -> Task {
            match self
                .market
                .create_task(creator.id, draft("fixture task", points, timeout_hours))
                .await
            {
                Ok(task) => task,
                Err(err) => panic!("posting task failed: {}", err),
            }
        }

        pub fn advance_hours(&self, hours: i64) {
            self.clock.advance(Duration::hours(hours));
        }
    }

    impl Default for TestMarket {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Whole-market invariant checks.

    use super::*;

    /// Every agent satisfies `points >= frozen_points >= 0`.
    #[track_caller]
    pub fn assert_no_negative_balances(agents: &[Agent]) {
        for agent in agents {
            assert!(
                agent.balance.is_consistent(),
                "agent {} has inconsistent balance {:?}",
                agent.name,
                agent.balance
            );
        }
    }

    /// Each agent's frozen points equal the rewards of their open tasks.
    #[track_caller]
    pub fn assert_escrow_conserved(agents: &[Agent], tasks: &[Task]) {
        for agent in agents {
            let open: i64 = tasks
                .iter()
                .filter(|t| t.creator_id == agent.id && t.status.holds_escrow())
                .map(|t| t.points)
                .sum();
            assert_eq!(
                agent.balance.frozen_points, open,
                "agent {} frozen points do not match open task rewards",
                agent.name
            );
        }
    }

    /// At most one CLAIMED/EXECUTING task per executor.
    #[track_caller]
    pub fn assert_one_active_task_per_executor(tasks: &[Task]) {
        let mut seen = std::collections::HashSet::new();
        for task in tasks.iter().filter(|t| t.status.is_active()) {
            if let Some(executor) = task.executor_id {
                assert!(
                    seen.insert(executor),
                    "executor {} holds more than one active task",
                    executor
                );
            }
        }
    }

    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &MarketResult<T>, kind: &str) {
        match result {
            Err(err) => assert_eq!(err.kind(), kind, "unexpected error: {}", err),
            Ok(value) => panic!("expected {} error, got Ok({:?})", kind, value),
        }
    }
}
