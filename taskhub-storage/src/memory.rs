//! In-memory [`MarketStore`] used for development and tests.
//!
//! A transaction takes the store-wide lock for its whole lifetime and works
//! on a private copy of the state. Commit swaps the copy in; dropping the
//! transaction throws it away. Transactions are therefore fully serialized,
//! which is stronger than the row locks the Postgres store takes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use taskhub_core::{
    Agent, AgentId, AgentStatus, Balance, CommentId, EntityType, MarketError, MarketResult,
    PointLog, PointLogType, StorageError, Task, TaskComment, TaskCommentVote, TaskFilter, TaskId,
    TaskLog, TaskStatus, Timestamp,
};

use crate::{MarketStore, MarketTx};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MarketState {
    agents: HashMap<AgentId, Agent>,
    tasks: HashMap<TaskId, Task>,
    task_logs: Vec<TaskLog>,
    point_logs: Vec<PointLog>,
    comments: Vec<TaskComment>,
    votes: HashMap<(CommentId, AgentId), TaskCommentVote>,
}

impl MarketState {
    fn votes_for_task(&self, task_id: TaskId) -> Vec<TaskCommentVote> {
        let comment_ids: HashSet<CommentId> = self
            .comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .map(|c| c.id)
            .collect();
        self.votes
            .values()
            .filter(|v| comment_ids.contains(&v.comment_id))
            .cloned()
            .collect()
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Shared in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MarketState>>,
    failing_tasks: Arc<RwLock<HashSet<TaskId>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an agent holding `initial_points`, recorded as an INIT entry.
    pub async fn seed_agent(&self, mut agent: Agent, initial_points: i64) -> MarketResult<Agent> {
        let mut state = self.state.lock().await;
        if initial_points != 0 {
            agent.balance = Balance::default()
                .credit(initial_points)
                .map_err(|e| MarketError::from_ledger(agent.id, e))?;
            state.point_logs.push(PointLog::new(
                agent.id,
                initial_points,
                PointLogType::Init,
                None,
                agent.balance,
                agent.created_at,
            ));
        }
        state.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    /// Change an agent's directory status outside the normal flows.
    pub async fn set_agent_status(&self, id: AgentId, status: AgentStatus) -> MarketResult<()> {
        let mut state = self.state.lock().await;
        let agent = state
            .agents
            .get_mut(&id)
            .ok_or(MarketError::not_found(EntityType::Agent, id))?;
        agent.status = status;
        Ok(())
    }

    /// Make every subsequent write to `task_id` fail until cleared.
    pub async fn fail_task_writes(&self, task_id: TaskId) {
        self.failing_tasks.write().await.insert(task_id);
    }

    pub async fn clear_failures(&self) {
        self.failing_tasks.write().await.clear();
    }

    pub async fn agent_count(&self) -> usize {
        self.state.lock().await.agents.len()
    }

    pub async fn task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    /// Every agent, for whole-market checks in tests.
    pub async fn all_agents(&self) -> Vec<Agent> {
        self.state.lock().await.agents.values().cloned().collect()
    }

    pub async fn all_tasks(&self) -> Vec<Task> {
        self.state.lock().await.tasks.values().cloned().collect()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn begin(&self) -> MarketResult<Box<dyn MarketTx>> {
        let failing_tasks = self.failing_tasks.read().await.clone();
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            failing_tasks,
            finished: false,
        }))
    }

    async fn ping(&self) -> MarketResult<()> {
        Ok(())
    }

    async fn agent_get(&self, id: AgentId) -> MarketResult<Option<Agent>> {
        Ok(self.state.lock().await.agents.get(&id).cloned())
    }

    async fn agent_by_key_hash(&self, api_key_hash: &str) -> MarketResult<Option<Agent>> {
        let state = self.state.lock().await;
        Ok(state
            .agents
            .values()
            .find(|a| a.api_key_hash == api_key_hash)
            .cloned())
    }

    async fn task_get(&self, id: TaskId) -> MarketResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn task_list(&self, filter: &TaskFilter) -> MarketResult<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn task_logs(&self, task_id: TaskId) -> MarketResult<Vec<TaskLog>> {
        let state = self.state.lock().await;
        Ok(state
            .task_logs
            .iter()
            .filter(|l| l.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn point_log_page(
        &self,
        agent_id: AgentId,
        limit: i64,
        offset: i64,
    ) -> MarketResult<Vec<PointLog>> {
        let state = self.state.lock().await;
        Ok(state
            .point_logs
            .iter()
            .rev()
            .filter(|l| l.agent_id == agent_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn point_log_replay(&self, agent_id: AgentId) -> MarketResult<Vec<PointLog>> {
        let state = self.state.lock().await;
        Ok(state
            .point_logs
            .iter()
            .filter(|l| l.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn comment_get(&self, id: CommentId) -> MarketResult<Option<TaskComment>> {
        let state = self.state.lock().await;
        Ok(state.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn comments_for_task(&self, task_id: TaskId) -> MarketResult<Vec<TaskComment>> {
        let state = self.state.lock().await;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn votes_for_task(&self, task_id: TaskId) -> MarketResult<Vec<TaskCommentVote>> {
        Ok(self.state.lock().await.votes_for_task(task_id))
    }

    async fn overdue_task_ids(&self, now: Timestamp, limit: i64) -> MarketResult<Vec<TaskId>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<&Task> = state.tasks.values().filter(|t| t.is_overdue(now)).collect();
        tasks.sort_by_key(|t| t.deadline);
        Ok(tasks
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| t.id)
            .collect())
    }

    async fn unverified_task_ids(
        &self,
        completed_before: Timestamp,
        limit: i64,
    ) -> MarketResult<Vec<TaskId>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<&Task> = state
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Completed
                    && t.completed_at.is_some_and(|at| at < completed_before)
            })
            .collect();
        tasks.sort_by_key(|t| t.completed_at);
        Ok(tasks
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|t| t.id)
            .collect())
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Transaction over a [`MemoryStore`]. Holds the store lock until dropped.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MarketState>,
    working: MarketState,
    failing_tasks: HashSet<TaskId>,
    finished: bool,
}

impl MemoryTx {
    fn state(&mut self) -> MarketResult<&mut MarketState> {
        if self.finished {
            return Err(StorageError::TransactionFailed {
                reason: "transaction already finished".to_string(),
            }
            .into());
        }
        Ok(&mut self.working)
    }

    fn check_task_write(&self, task_id: TaskId) -> MarketResult<()> {
        if self.failing_tasks.contains(&task_id) {
            return Err(StorageError::UpdateFailed {
                entity_type: EntityType::Task,
                id: task_id,
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl MarketTx for MemoryTx {
    async fn agent_for_update(&mut self, id: AgentId) -> MarketResult<Option<Agent>> {
        Ok(self.state()?.agents.get(&id).cloned())
    }

    async fn agent_name_taken(&mut self, name: &str) -> MarketResult<bool> {
        let state = self.state()?;
        Ok(state
            .agents
            .values()
            .any(|a| a.name.eq_ignore_ascii_case(name)))
    }

    async fn agent_insert(&mut self, agent: &Agent) -> MarketResult<()> {
        let state = self.state()?;
        if state.agents.contains_key(&agent.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Agent,
                reason: format!("duplicate id {}", agent.id),
            }
            .into());
        }
        state.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn agent_update(&mut self, agent: &Agent) -> MarketResult<()> {
        let state = self.state()?;
        match state.agents.get_mut(&agent.id) {
            Some(slot) => {
                *slot = agent.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound {
                entity_type: EntityType::Agent,
                id: agent.id,
            }
            .into()),
        }
    }

    async fn task_for_update(&mut self, id: TaskId) -> MarketResult<Option<Task>> {
        Ok(self.state()?.tasks.get(&id).cloned())
    }

    async fn task_insert(&mut self, task: &Task) -> MarketResult<()> {
        self.check_task_write(task.id)?;
        let state = self.state()?;
        if state.tasks.contains_key(&task.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Task,
                reason: format!("duplicate id {}", task.id),
            }
            .into());
        }
        state.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn task_update(&mut self, task: &Task) -> MarketResult<()> {
        self.check_task_write(task.id)?;
        let state = self.state()?;
        match state.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound {
                entity_type: EntityType::Task,
                id: task.id,
            }
            .into()),
        }
    }

    async fn active_task_for(&mut self, executor_id: AgentId) -> MarketResult<Option<TaskId>> {
        let state = self.state()?;
        Ok(state
            .tasks
            .values()
            .find(|t| t.status.is_active() && t.executor_id == Some(executor_id))
            .map(|t| t.id))
    }

    async fn point_log_append(&mut self, log: &PointLog) -> MarketResult<()> {
        self.state()?.point_logs.push(log.clone());
        Ok(())
    }

    async fn task_log_append(&mut self, log: &TaskLog) -> MarketResult<()> {
        self.state()?.task_logs.push(log.clone());
        Ok(())
    }

    async fn comment_count(&mut self, task_id: TaskId, author_id: AgentId) -> MarketResult<i64> {
        let state = self.state()?;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.task_id == task_id && c.author_id == author_id)
            .count() as i64)
    }

    async fn comment_insert(&mut self, comment: &TaskComment) -> MarketResult<()> {
        self.state()?.comments.push(comment.clone());
        Ok(())
    }

    async fn vote_upsert(&mut self, vote: &TaskCommentVote) -> MarketResult<()> {
        self.state()?
            .votes
            .insert((vote.comment_id, vote.voter_id), vote.clone());
        Ok(())
    }

    async fn commit(&mut self) -> MarketResult<()> {
        let working = std::mem::take(self.state()?);
        *self.guard = working;
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> MarketResult<()> {
        self.state()?;
        self.working = MarketState::default();
        self.finished = true;
        tracing::debug!("memory transaction rolled back");
        Ok(())
    }
}
