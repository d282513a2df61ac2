//! Task state machine operations.
//!
//! Each operation loads the task row for update, checks the caller and the
//! transition, then performs the status write together with its ledger and
//! reputation effects in the same transaction.

use serde::{Deserialize, Serialize};

use taskhub_core::{
    AgentId, EntityType, MarketError, MarketResult, StateConflict, Task, TaskAction, TaskDraft,
    TaskFilter, TaskId, TaskLog, TaskStatus, Timestamp, ValidationError,
};
use taskhub_storage::MarketTx;

use crate::{directory, finish, ledger, Market};

// ============================================================================
// INPUTS / OUTPUTS
// ============================================================================

/// Executor progress callback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub progress: Option<i32>,
    /// Only `EXECUTING` may be reported.
    pub status: Option<String>,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// Executor delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub delivery_summary: Option<String>,
    pub result_url: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// Creator's verdict on a completed task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyDecision {
    pub approved: Option<bool>,
    pub reason: Option<String>,
}

/// A task with its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub logs: Vec<TaskLog>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

impl Market {
    /// Post a task, escrowing its reward from the creator's available points.
    pub async fn create_task(&self, creator_id: AgentId, draft: TaskDraft) -> MarketResult<Task> {
        let draft = draft.validate()?;
        let now = self.now();
        let task = Task::new(draft, creator_id, now);

        let mut tx = self.store.begin().await?;
        let outcome = create_in(tx.as_mut(), &task, now).await;
        finish(tx, outcome).await?;

        tracing::info!(
            task_id = %task.id,
            creator_id = %creator_id,
            points = task.points,
            "Task created"
        );
        Ok(task)
    }

    pub async fn claim_task(&self, task_id: TaskId, executor_id: AgentId) -> MarketResult<Task> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let outcome = claim_in(tx.as_mut(), task_id, executor_id, now).await;
        let task = finish(tx, outcome).await?;

        tracing::info!(task_id = %task_id, executor_id = %executor_id, "Task claimed");
        Ok(task)
    }

    pub async fn report_progress(
        &self,
        task_id: TaskId,
        caller_id: AgentId,
        report: ProgressReport,
    ) -> MarketResult<Task> {
        let reported_status = validate_progress(&report)?;
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let outcome = progress_in(tx.as_mut(), task_id, caller_id, reported_status, report, now).await;
        let task = finish(tx, outcome).await?;

        tracing::debug!(task_id = %task_id, progress = task.progress, "Task progress reported");
        Ok(task)
    }

    pub async fn complete_task(
        &self,
        task_id: TaskId,
        executor_id: AgentId,
        report: CompletionReport,
    ) -> MarketResult<Task> {
        let summary = report
            .delivery_summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "deliverySummary".to_string(),
            })?;
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let outcome = complete_in(tx.as_mut(), task_id, executor_id, summary, report, now).await;
        let task = finish(tx, outcome).await?;

        tracing::info!(task_id = %task_id, executor_id = %executor_id, "Task completed");
        Ok(task)
    }

    /// Approve (settle to the executor) or reject (refund the creator).
    pub async fn verify_task(
        &self,
        task_id: TaskId,
        creator_id: AgentId,
        decision: VerifyDecision,
    ) -> MarketResult<Task> {
        let approved = decision
            .approved
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "approved".to_string(),
            })?;
        let reason = decision.reason.filter(|r| !r.trim().is_empty());
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let outcome = verify_in(tx.as_mut(), task_id, creator_id, approved, reason, now).await;
        let task = finish(tx, outcome).await?;

        tracing::info!(
            task_id = %task_id,
            approved,
            status = %task.status,
            "Task verified"
        );
        Ok(task)
    }

    pub async fn cancel_task(&self, task_id: TaskId, creator_id: AgentId) -> MarketResult<Task> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let outcome = cancel_in(tx.as_mut(), task_id, creator_id, now).await;
        let task = finish(tx, outcome).await?;

        tracing::info!(task_id = %task_id, points = task.points, "Task cancelled");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: TaskId) -> MarketResult<TaskDetail> {
        let task = self
            .store
            .task_get(task_id)
            .await?
            .ok_or(MarketError::not_found(EntityType::Task, task_id))?;
        let logs = self.store.task_logs(task_id).await?;
        Ok(TaskDetail { task, logs })
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> MarketResult<Vec<Task>> {
        self.store.task_list(filter).await
    }
}

// ============================================================================
// TRANSACTION BODIES
// ============================================================================

async fn load_task(tx: &mut dyn MarketTx, task_id: TaskId) -> MarketResult<Task> {
    tx.task_for_update(task_id)
        .await?
        .ok_or(MarketError::not_found(EntityType::Task, task_id))
}

fn executor_of(task: &Task) -> MarketResult<AgentId> {
    task.executor_id.ok_or_else(|| MarketError::Internal {
        reason: format!("task {} in {} has no executor", task.id, task.status),
    })
}

async fn create_in(tx: &mut dyn MarketTx, task: &Task, now: Timestamp) -> MarketResult<()> {
    tx.task_insert(task).await?;
    ledger::freeze(tx, task.creator_id, task.points, task.id, now).await?;
    tx.task_log_append(&TaskLog::status_change(
        task.id,
        TaskStatus::Pending,
        "task created",
        now,
    ))
    .await
}

async fn claim_in(
    tx: &mut dyn MarketTx,
    task_id: TaskId,
    executor_id: AgentId,
    now: Timestamp,
) -> MarketResult<Task> {
    let mut task = load_task(tx, task_id).await?;
    if task.is_creator(executor_id) {
        return Err(StateConflict::SelfClaim { task_id }.into());
    }
    task.apply(TaskAction::Claim, now)?;

    // Locks the executor row so two claims by the same agent serialize here.
    tx.agent_for_update(executor_id)
        .await?
        .ok_or(MarketError::not_found(EntityType::Agent, executor_id))?;
    if let Some(active_task_id) = tx.active_task_for(executor_id).await? {
        return Err(StateConflict::ExecutorBusy {
            agent_id: executor_id,
            active_task_id,
        }
        .into());
    }

    task.executor_id = Some(executor_id);
    tx.task_update(&task).await?;
    tx.task_log_append(&TaskLog::status_change(
        task_id,
        TaskStatus::Claimed,
        format!("claimed by {}", executor_id),
        now,
    ))
    .await?;
    Ok(task)
}

fn validate_progress(report: &ProgressReport) -> MarketResult<Option<TaskStatus>> {
    if let Some(progress) = report.progress {
        if !(0..=100).contains(&progress) {
            return Err(ValidationError::InvalidValue {
                field: "progress".to_string(),
                reason: "must be between 0 and 100".to_string(),
            }
            .into());
        }
    }
    match report.status.as_deref() {
        None => Ok(None),
        Some(raw) => match raw.parse::<TaskStatus>() {
            Ok(TaskStatus::Executing) => Ok(Some(TaskStatus::Executing)),
            _ => Err(ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("'{}' cannot be reported; only EXECUTING is accepted", raw),
            }
            .into()),
        },
    }
}

async fn progress_in(
    tx: &mut dyn MarketTx,
    task_id: TaskId,
    caller_id: AgentId,
    reported_status: Option<TaskStatus>,
    report: ProgressReport,
    now: Timestamp,
) -> MarketResult<Task> {
    let mut task = load_task(tx, task_id).await?;
    if !task.is_executor(caller_id) {
        return Err(MarketError::forbidden("only the executor can report progress"));
    }
    if !task.status.is_active() {
        return Err(StateConflict::InvalidTransition {
            task_id,
            from: task.status,
            action: TaskAction::Start,
        }
        .into());
    }

    let before = task.status;
    if reported_status.is_some() {
        task.apply(TaskAction::Start, now)?;
    }
    if let Some(progress) = report.progress {
        task.progress = progress;
    }
    task.updated_at = now;
    tx.task_update(&task).await?;

    let log = TaskLog {
        id: taskhub_core::new_entity_id(),
        task_id,
        status: (task.status != before).then_some(task.status),
        progress: report.progress,
        message: report.message,
        result: report.result,
        created_at: now,
    };
    tx.task_log_append(&log).await?;
    Ok(task)
}

async fn complete_in(
    tx: &mut dyn MarketTx,
    task_id: TaskId,
    executor_id: AgentId,
    summary: String,
    report: CompletionReport,
    now: Timestamp,
) -> MarketResult<Task> {
    let mut task = load_task(tx, task_id).await?;
    if !task.is_executor(executor_id) {
        return Err(MarketError::forbidden("only the executor can complete this task"));
    }
    task.apply(TaskAction::Complete, now)?;
    task.delivery_summary = Some(summary.clone());
    task.result_url = report.result_url.filter(|u| !u.trim().is_empty());
    task.result = report.result;
    tx.task_update(&task).await?;
    tx.task_log_append(
        &TaskLog::status_change(task_id, TaskStatus::Completed, summary, now)
            .with_progress(Some(100))
            .with_result(task.result.clone()),
    )
    .await?;
    Ok(task)
}

async fn verify_in(
    tx: &mut dyn MarketTx,
    task_id: TaskId,
    creator_id: AgentId,
    approved: bool,
    reason: Option<String>,
    now: Timestamp,
) -> MarketResult<Task> {
    let mut task = load_task(tx, task_id).await?;
    if !task.is_creator(creator_id) {
        return Err(MarketError::forbidden("only the creator can verify this task"));
    }
    if approved {
        task.apply(TaskAction::Approve, now)?;
        settle_in(tx, &task, now).await?;
    } else {
        task.apply(TaskAction::Reject, now)?;
        ledger::release(tx, task.creator_id, task.points, task_id, now).await?;
        directory::record_rejection(tx, task.creator_id, now).await?;
    }
    tx.task_update(&task).await?;

    let verdict = if approved { "approved" } else { "rejected" };
    let message = match reason {
        Some(reason) => format!("{}: {}", verdict, reason),
        None => verdict.to_string(),
    };
    tx.task_log_append(&TaskLog::status_change(task_id, task.status, message, now))
        .await?;
    Ok(task)
}

async fn cancel_in(
    tx: &mut dyn MarketTx,
    task_id: TaskId,
    creator_id: AgentId,
    now: Timestamp,
) -> MarketResult<Task> {
    let mut task = load_task(tx, task_id).await?;
    if !task.is_creator(creator_id) {
        return Err(MarketError::forbidden("only the creator can cancel this task"));
    }
    task.apply(TaskAction::Cancel, now)?;
    ledger::refund(tx, task.creator_id, task.points, task_id, now).await?;
    tx.task_update(&task).await?;
    tx.task_log_append(&TaskLog::status_change(
        task_id,
        TaskStatus::Cancelled,
        "cancelled by creator",
        now,
    ))
    .await?;
    Ok(task)
}

/// Pay the executor and credit both sides' reputation.
pub(crate) async fn settle_in(tx: &mut dyn MarketTx, task: &Task, now: Timestamp) -> MarketResult<()> {
    let executor_id = executor_of(task)?;
    ledger::settle(tx, task.creator_id, executor_id, task.points, task.id, now).await?;
    directory::record_settlement(tx, task.creator_id, executor_id, now).await
}

/// Refund an overdue task's escrow to its creator.
pub(crate) async fn expire_in(tx: &mut dyn MarketTx, task: &mut Task, now: Timestamp) -> MarketResult<()> {
    task.apply(TaskAction::ExecutorTimeout, now)?;
    ledger::refund(tx, task.creator_id, task.points, task.id, now).await?;
    tx.task_update(task).await?;
    tx.task_log_append(&TaskLog::status_change(
        task.id,
        TaskStatus::Refunded,
        "executor timeout, refunded",
        now,
    ))
    .await
}

/// Settle a task the creator never verified.
pub(crate) async fn auto_pass_in(
    tx: &mut dyn MarketTx,
    task: &mut Task,
    now: Timestamp,
) -> MarketResult<()> {
    task.apply(TaskAction::VerifierTimeout, now)?;
    settle_in(tx, task, now).await?;
    tx.task_update(task).await?;
    tx.task_log_append(&TaskLog::status_change(
        task.id,
        TaskStatus::Done,
        "verifier timeout, auto-passed",
        now,
    ))
    .await
}
