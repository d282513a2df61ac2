//! Task lifecycle.
//!
//! Every status change goes through [`next_status`], a single table of
//! `(from, action) -> to`. Pairs missing from the table are illegal.
//!
//! ```text
//! PENDING   --Claim-->                     CLAIMED
//! CLAIMED   --Start-->                     EXECUTING
//! EXECUTING --Start-->                     EXECUTING
//! CLAIMED   --Complete-->                  COMPLETED
//! EXECUTING --Complete-->                  COMPLETED
//! COMPLETED --Approve | VerifierTimeout--> DONE
//! COMPLETED --Reject-->                    REFUNDED
//! CLAIMED   --ExecutorTimeout-->           REFUNDED
//! EXECUTING --ExecutorTimeout-->           REFUNDED
//! PENDING | CLAIMED | EXECUTING --Cancel--> CANCELLED
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MAX_TIMEOUT_HOURS, MAX_TITLE_LENGTH,
};
use crate::error::{StateConflict, ValidationError};
use crate::{new_entity_id, AgentId, LogId, TaskId, Timestamp};

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Executing,
    Completed,
    Done,
    Refunded,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::Claimed,
        TaskStatus::Executing,
        TaskStatus::Completed,
        TaskStatus::Done,
        TaskStatus::Refunded,
        TaskStatus::Cancelled,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Claimed => "CLAIMED",
            TaskStatus::Executing => "EXECUTING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Done => "DONE",
            TaskStatus::Refunded => "REFUNDED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, TaskStatusParseError> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TaskStatus::Pending),
            "CLAIMED" => Ok(TaskStatus::Claimed),
            "EXECUTING" => Ok(TaskStatus::Executing),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "DONE" => Ok(TaskStatus::Done),
            "REFUNDED" => Ok(TaskStatus::Refunded),
            "CANCELLED" => Ok(TaskStatus::Cancelled),
            _ => Err(TaskStatusParseError(s.to_string())),
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Refunded | TaskStatus::Cancelled
        )
    }

    /// Held by an executor and counting against the one-active-task rule.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Claimed | TaskStatus::Executing)
    }

    /// The creator's escrow for the task is still frozen.
    pub fn holds_escrow(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid task status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid task status: {}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ============================================================================
// TRANSITION TABLE
// ============================================================================

/// Events that move a task between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Claim,
    /// Executor reports it is working on the task.
    Start,
    Complete,
    Approve,
    Reject,
    Cancel,
    ExecutorTimeout,
    VerifierTimeout,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Claim => "claim",
            TaskAction::Start => "start",
            TaskAction::Complete => "complete",
            TaskAction::Approve => "approve",
            TaskAction::Reject => "reject",
            TaskAction::Cancel => "cancel",
            TaskAction::ExecutorTimeout => "executor_timeout",
            TaskAction::VerifierTimeout => "verifier_timeout",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TRANSITIONS: &[(TaskStatus, TaskAction, TaskStatus)] = &[
    (TaskStatus::Pending, TaskAction::Claim, TaskStatus::Claimed),
    (TaskStatus::Claimed, TaskAction::Start, TaskStatus::Executing),
    (TaskStatus::Executing, TaskAction::Start, TaskStatus::Executing),
    (TaskStatus::Claimed, TaskAction::Complete, TaskStatus::Completed),
    (TaskStatus::Executing, TaskAction::Complete, TaskStatus::Completed),
    (TaskStatus::Completed, TaskAction::Approve, TaskStatus::Done),
    (TaskStatus::Completed, TaskAction::Reject, TaskStatus::Refunded),
    (TaskStatus::Completed, TaskAction::VerifierTimeout, TaskStatus::Done),
    (TaskStatus::Claimed, TaskAction::ExecutorTimeout, TaskStatus::Refunded),
    (TaskStatus::Executing, TaskAction::ExecutorTimeout, TaskStatus::Refunded),
    (TaskStatus::Pending, TaskAction::Cancel, TaskStatus::Cancelled),
    (TaskStatus::Claimed, TaskAction::Cancel, TaskStatus::Cancelled),
    (TaskStatus::Executing, TaskAction::Cancel, TaskStatus::Cancelled),
];

/// Look up the status `action` leads to from `from`.
pub fn next_status(from: TaskStatus, action: TaskAction) -> Option<TaskStatus> {
    TRANSITIONS
        .iter()
        .find(|(f, a, _)| *f == from && *a == action)
        .map(|(_, _, to)| *to)
}

// ============================================================================
// TASK
// ============================================================================

/// A unit of work posted to the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    /// Escrowed reward; fixed at creation.
    pub points: i64,
    pub timeout_hours: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub deadline: Timestamp,
    pub status: TaskStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub creator_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub executor_id: Option<AgentId>,
    pub progress: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<serde_json::Value>,
    pub result_url: Option<String>,
    pub delivery_summary: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub claimed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub verified_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Task {
    pub fn new(draft: ValidTaskDraft, creator_id: AgentId, now: Timestamp) -> Self {
        Self {
            id: new_entity_id(),
            title: draft.title,
            description: draft.description,
            points: draft.points,
            timeout_hours: draft.timeout_hours,
            deadline: now + Duration::hours(draft.timeout_hours),
            status: TaskStatus::Pending,
            creator_id,
            executor_id: None,
            progress: 0,
            result: None,
            result_url: None,
            delivery_summary: None,
            created_at: now,
            claimed_at: None,
            completed_at: None,
            verified_at: None,
            updated_at: now,
        }
    }

    /// Apply `action` through the transition table, stamping the timestamps
    /// the action owns. Leaves the task untouched on failure.
    pub fn apply(&mut self, action: TaskAction, now: Timestamp) -> Result<TaskStatus, StateConflict> {
        let next = next_status(self.status, action).ok_or_else(|| match (self.status, action) {
            (_, TaskAction::Claim) => StateConflict::AlreadyClaimed { task_id: self.id },
            (from, action) => StateConflict::InvalidTransition {
                task_id: self.id,
                from,
                action,
            },
        })?;
        match action {
            TaskAction::Claim => {
                self.claimed_at = Some(now);
                self.deadline = now + Duration::hours(self.timeout_hours);
            }
            TaskAction::Complete => {
                self.completed_at = Some(now);
                self.progress = 100;
            }
            TaskAction::Approve | TaskAction::Reject | TaskAction::VerifierTimeout => {
                self.verified_at = Some(now);
            }
            TaskAction::Start | TaskAction::Cancel | TaskAction::ExecutorTimeout => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(next)
    }

    pub fn is_executor(&self, agent_id: AgentId) -> bool {
        self.executor_id == Some(agent_id)
    }

    pub fn is_creator(&self, agent_id: AgentId) -> bool {
        self.creator_id == agent_id
    }

    /// Execution deadline has passed while the task is still held.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status.is_active() && self.deadline < now
    }

    /// Completed and left unverified past the grace window.
    pub fn is_verification_overdue(&self, now: Timestamp, grace: Duration) -> bool {
        self.status == TaskStatus::Completed
            && self.completed_at.is_some_and(|at| at < now - grace)
    }
}

// ============================================================================
// CREATION INPUT
// ============================================================================

/// Raw task creation input. All fields are optional so that absence can be
/// reported as a validation failure rather than a decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub points: Option<i64>,
    #[serde(alias = "timeout")]
    pub timeout_hours: Option<i64>,
}

/// A task draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub points: i64,
    pub timeout_hours: i64,
}

impl TaskDraft {
    pub fn validate(self) -> Result<ValidTaskDraft, ValidationError> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| missing("title"))?;
        let points = self.points.ok_or_else(|| missing("points"))?;
        let timeout_hours = self.timeout_hours.ok_or_else(|| missing("timeout"))?;

        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(invalid(
                "title",
                format!("must be at most {} characters", MAX_TITLE_LENGTH),
            ));
        }
        if points <= 0 {
            return Err(invalid("points", "must be a positive integer".to_string()));
        }
        if !(1..=MAX_TIMEOUT_HOURS).contains(&timeout_hours) {
            return Err(invalid(
                "timeout",
                format!("must be between 1 and {} hours", MAX_TIMEOUT_HOURS),
            ));
        }

        Ok(ValidTaskDraft {
            title,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            points,
            timeout_hours,
        })
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}

// ============================================================================
// TASK LOG
// ============================================================================

/// Audit entry for a status change or progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskLog {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: LogId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TaskId,
    pub status: Option<TaskStatus>,
    pub progress: Option<i32>,
    pub message: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<serde_json::Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl TaskLog {
    pub fn status_change(
        task_id: TaskId,
        status: TaskStatus,
        message: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_entity_id(),
            task_id,
            status: Some(status),
            progress: None,
            message: Some(message.into()),
            result: None,
            created_at: now,
        }
    }

    pub fn with_progress(mut self, progress: Option<i32>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_result(mut self, result: Option<serde_json::Value>) -> Self {
        self.result = result;
        self
    }
}

// ============================================================================
// LISTING
// ============================================================================

/// Filter for task listings. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub creator_id: Option<AgentId>,
    pub executor_id: Option<AgentId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self.creator_id.is_none_or(|id| task.creator_id == id)
            && self.executor_id.is_none_or(|id| task.executor_id == Some(id))
    }

    pub fn effective_limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Clamp a requested page size into `1..=MAX_PAGE_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}
