//! Request and response bodies.
//!
//! Request fields are optional so that a missing field surfaces as a
//! `MISSING_FIELD` validation error from the market instead of a decode
//! failure.

use axum::Json;
use serde::{Deserialize, Serialize};

use taskhub_core::{AgentProfile, Task, TaskLog};
use taskhub_market::{
    CompletionReport, NewComment, ProgressReport, RegisterAgent, Registration, SweepFailure,
    SweepReport, TaskDetail, VerifyDecision,
};

use crate::constants::OK_MESSAGE;
use crate::error::ApiResult;

// ============================================================================
// ENVELOPE
// ============================================================================

/// Success envelope: `{code: 0, message: "ok", data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            code: 0,
            message: OK_MESSAGE.to_string(),
            data,
        })
    }
}

pub type ApiReply<T> = ApiResult<Json<Envelope<T>>>;

// ============================================================================
// AGENTS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl From<RegisterAgentRequest> for RegisterAgent {
    fn from(req: RegisterAgentRequest) -> Self {
        RegisterAgent {
            name: req.name,
            description: req.description,
        }
    }
}

/// Returned once at registration; the key cannot be recovered later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub agent: AgentProfile,
    pub api_key: String,
}

impl From<Registration> for RegistrationResponse {
    fn from(registration: Registration) -> Self {
        Self {
            agent: registration.agent,
            api_key: registration.api_key,
        }
    }
}

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ProgressCallbackRequest {
    /// 0 to 100.
    pub progress: Option<i32>,
    /// Only `EXECUTING` is accepted.
    pub status: Option<String>,
    pub message: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<serde_json::Value>,
}

impl From<ProgressCallbackRequest> for ProgressReport {
    fn from(req: ProgressCallbackRequest) -> Self {
        ProgressReport {
            progress: req.progress,
            status: req.status,
            message: req.message,
            result: req.result,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    pub delivery_summary: Option<String>,
    pub result_url: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<serde_json::Value>,
}

impl From<CompleteTaskRequest> for CompletionReport {
    fn from(req: CompleteTaskRequest) -> Self {
        CompletionReport {
            delivery_summary: req.delivery_summary,
            result_url: req.result_url,
            result: req.result,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct VerifyTaskRequest {
    pub approved: Option<bool>,
    pub reason: Option<String>,
}

impl From<VerifyTaskRequest> for VerifyDecision {
    fn from(req: VerifyTaskRequest) -> Self {
        VerifyDecision {
            approved: req.approved,
            reason: req.reason,
        }
    }
}

/// A task with its log trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    pub logs: Vec<TaskLog>,
}

impl From<TaskDetail> for TaskDetailResponse {
    fn from(detail: TaskDetail) -> Self {
        Self {
            task: detail.task,
            logs: detail.logs,
        }
    }
}

// ============================================================================
// COMMENTS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateCommentRequest {
    pub content: Option<String>,
}

impl From<CreateCommentRequest> for NewComment {
    fn from(req: CreateCommentRequest) -> Self {
        NewComment {
            content: req.content,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VoteRequest {
    /// `UP`, `DOWN` or `NONE`.
    pub value: Option<String>,
}

// ============================================================================
// POINTS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// CRON
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SweepFailureResponse {
    pub task_id: uuid::Uuid,
    /// `executor_timeout` or `verifier_timeout`.
    pub phase: String,
    pub error: String,
}

/// Outcome of one sweep run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub executor_timeout: usize,
    pub refunded: usize,
    pub verifier_timeout: usize,
    pub auto_passed: usize,
    pub skipped: usize,
    pub errors: Vec<SweepFailureResponse>,
}

impl From<SweepFailure> for SweepFailureResponse {
    fn from(failure: SweepFailure) -> Self {
        let phase = match failure.phase {
            taskhub_market::SweepPhase::ExecutorTimeout => "executor_timeout",
            taskhub_market::SweepPhase::VerifierTimeout => "verifier_timeout",
        };
        Self {
            task_id: failure.task_id,
            phase: phase.to_string(),
            error: failure.error,
        }
    }
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            executor_timeout: report.executor_timeout,
            refunded: report.refunded,
            verifier_timeout: report.verifier_timeout,
            auto_passed: report.auto_passed,
            skipped: report.skipped,
            errors: report.errors.into_iter().map(Into::into).collect(),
        }
    }
}
