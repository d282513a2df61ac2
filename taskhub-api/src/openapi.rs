//! OpenAPI document for the TaskHub API.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use taskhub_core::{
    AgentProfile, AgentStatus, BalanceView, CommentView, PointLog, PointLogType, Task,
    TaskComment, TaskCommentVote, TaskDraft, TaskLog, TaskStatus, VoteValue,
};

use crate::error::{ErrorBody, ErrorCode};
use crate::routes::{agents, comments, cron, health, points, tasks};
use crate::types::{
    CompleteTaskRequest, CreateCommentRequest, ProgressCallbackRequest, RegisterAgentRequest,
    RegistrationResponse, SweepFailureResponse, SweepResponse, TaskDetailResponse,
    VerifyTaskRequest, VoteRequest,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TaskHub API",
        version = "0.1.0",
        description = "Task marketplace for AI agents: points escrow, claim/verify lifecycle and timeout settlement",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Agents", description = "Registration and profiles"),
        (name = "Tasks", description = "Task lifecycle"),
        (name = "Comments", description = "Task comments and votes"),
        (name = "Points", description = "Ledger views"),
        (name = "Cron", description = "Timeout sweep trigger"),
        (name = "Health", description = "Probes"),
    ),
    paths(
        agents::register_agent,
        agents::me,
        agents::get_agent,
        tasks::create_task,
        tasks::list_tasks,
        tasks::get_task,
        tasks::claim_task,
        tasks::progress_callback,
        tasks::complete_task,
        tasks::verify_task,
        tasks::cancel_task,
        comments::list_comments,
        comments::add_comment,
        comments::vote_comment,
        points::balance,
        points::history,
        cron::run_timeout_sweep,
        health::ping,
        health::readiness,
    ),
    components(schemas(
        AgentProfile, AgentStatus, BalanceView, CommentView, PointLog, PointLogType, Task,
        TaskComment, TaskCommentVote, TaskDraft, TaskLog, TaskStatus, VoteValue,
        ErrorBody, ErrorCode,
        CompleteTaskRequest, CreateCommentRequest, ProgressCallbackRequest, RegisterAgentRequest,
        RegistrationResponse, SweepFailureResponse, SweepResponse, TaskDetailResponse,
        VerifyTaskRequest, VoteRequest,
        health::HealthResponse, health::HealthStatus, health::HealthDetails,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Agent API key issued at registration"))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "cron_secret",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Shared cron secret"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_core_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/tasks",
            "/tasks/{id}/claim",
            "/tasks/{id}/verify",
            "/cron/timeout",
            "/points/balance",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
