//! TaskHub Storage
//!
//! The transaction boundary for marketplace state. Every operation that
//! touches more than one row runs inside a [`MarketTx`]; reads that feed
//! listings and views go straight through [`MarketStore`].
//!
//! Row reads inside a transaction (`*_for_update`) lock the row until the
//! transaction ends, so checks and writes made through the same transaction
//! cannot interleave with another writer.

mod memory;

pub use memory::{MemoryStore, MemoryTx};

use async_trait::async_trait;
use taskhub_core::{
    Agent, AgentId, CommentId, MarketResult, PointLog, Task, TaskComment, TaskCommentVote,
    TaskFilter, TaskId, TaskLog, Timestamp,
};

/// Read access plus the ability to open transactions.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn begin(&self) -> MarketResult<Box<dyn MarketTx>>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> MarketResult<()>;

    async fn agent_get(&self, id: AgentId) -> MarketResult<Option<Agent>>;
    async fn agent_by_key_hash(&self, api_key_hash: &str) -> MarketResult<Option<Agent>>;

    async fn task_get(&self, id: TaskId) -> MarketResult<Option<Task>>;
    /// Newest first, paged by the filter.
    async fn task_list(&self, filter: &TaskFilter) -> MarketResult<Vec<Task>>;
    /// Oldest first.
    async fn task_logs(&self, task_id: TaskId) -> MarketResult<Vec<TaskLog>>;

    /// Newest first.
    async fn point_log_page(
        &self,
        agent_id: AgentId,
        limit: i64,
        offset: i64,
    ) -> MarketResult<Vec<PointLog>>;
    /// Every entry for the agent, oldest first.
    async fn point_log_replay(&self, agent_id: AgentId) -> MarketResult<Vec<PointLog>>;

    async fn comment_get(&self, id: CommentId) -> MarketResult<Option<TaskComment>>;
    /// Oldest first.
    async fn comments_for_task(&self, task_id: TaskId) -> MarketResult<Vec<TaskComment>>;
    async fn votes_for_task(&self, task_id: TaskId) -> MarketResult<Vec<TaskCommentVote>>;

    /// CLAIMED/EXECUTING tasks whose deadline is before `now`.
    async fn overdue_task_ids(&self, now: Timestamp, limit: i64) -> MarketResult<Vec<TaskId>>;
    /// COMPLETED tasks whose completion is before `completed_before`.
    async fn unverified_task_ids(
        &self,
        completed_before: Timestamp,
        limit: i64,
    ) -> MarketResult<Vec<TaskId>>;
}

/// A single atomic unit of work.
///
/// Dropping a transaction without calling [`MarketTx::commit`] discards
/// every write made through it.
#[async_trait]
pub trait MarketTx: Send {
    async fn agent_for_update(&mut self, id: AgentId) -> MarketResult<Option<Agent>>;
    async fn agent_name_taken(&mut self, name: &str) -> MarketResult<bool>;
    async fn agent_insert(&mut self, agent: &Agent) -> MarketResult<()>;
    async fn agent_update(&mut self, agent: &Agent) -> MarketResult<()>;

    async fn task_for_update(&mut self, id: TaskId) -> MarketResult<Option<Task>>;
    async fn task_insert(&mut self, task: &Task) -> MarketResult<()>;
    async fn task_update(&mut self, task: &Task) -> MarketResult<()>;
    /// The executor's task in CLAIMED or EXECUTING, if any.
    async fn active_task_for(&mut self, executor_id: AgentId) -> MarketResult<Option<TaskId>>;

    async fn point_log_append(&mut self, log: &PointLog) -> MarketResult<()>;
    async fn task_log_append(&mut self, log: &TaskLog) -> MarketResult<()>;

    async fn comment_count(&mut self, task_id: TaskId, author_id: AgentId) -> MarketResult<i64>;
    async fn comment_insert(&mut self, comment: &TaskComment) -> MarketResult<()>;
    /// Insert or replace the vote for `(comment_id, voter_id)`.
    async fn vote_upsert(&mut self, vote: &TaskCommentVote) -> MarketResult<()>;

    async fn commit(&mut self) -> MarketResult<()>;
    async fn rollback(&mut self) -> MarketResult<()>;
}
