//! Task lifecycle endpoints.
//!
//! Every route requires an authenticated agent. Role checks (creator vs
//! executor) happen in the market so the HTTP layer stays a thin adapter.

use axum::{extract::State, routing::{get, post}, Router};

use taskhub_core::{Task, TaskDraft, TaskFilter};

use crate::auth::AuthAgent;
use crate::extract::{ApiJson, ApiQuery, PathId};
use crate::routes::comments;
use crate::state::AppState;
use crate::types::{
    ApiReply, CompleteTaskRequest, Envelope, ProgressCallbackRequest, TaskDetailResponse,
    VerifyTaskRequest,
};

/// POST /tasks
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    request_body = TaskDraft,
    responses(
        (status = 200, description = "Task posted and reward escrowed", body = Task),
        (status = 400, description = "Missing fields or insufficient points", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    ApiJson(draft): ApiJson<TaskDraft>,
) -> ApiReply<Task> {
    let task = state.market.create_task(agent.id, draft).await?;
    Ok(Envelope::ok(task))
}

/// GET /tasks
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("creatorId" = Option<uuid::Uuid>, Query, description = "Filter by creator"),
        ("executorId" = Option<uuid::Uuid>, Query, description = "Filter by executor"),
        ("limit" = Option<i64>, Query, description = "Page size, 1 to 100 (default 20)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip"),
    ),
    responses(
        (status = 200, description = "Tasks, newest first", body = Vec<Task>),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthAgent(_caller): AuthAgent,
    ApiQuery(filter): ApiQuery<TaskFilter>,
) -> ApiReply<Vec<Task>> {
    let tasks = state.market.list_tasks(&filter).await?;
    Ok(Envelope::ok(tasks))
}

/// GET /tasks/:id
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task with its log trail", body = TaskDetailResponse),
        (status = 404, description = "Task not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthAgent(_caller): AuthAgent,
    PathId(id): PathId,
) -> ApiReply<TaskDetailResponse> {
    let detail = state.market.get_task(id).await?;
    Ok(Envelope::ok(detail.into()))
}

/// POST /tasks/:id/claim
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks/{id}/claim",
    tag = "Tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task claimed", body = Task),
        (status = 400, description = "Already claimed, own task, or executor busy", body = crate::error::ErrorBody),
        (status = 404, description = "Task not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn claim_task(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(id): PathId,
) -> ApiReply<Task> {
    let task = state.market.claim_task(id, agent.id).await?;
    Ok(Envelope::ok(task))
}

/// POST /tasks/:id/callback
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks/{id}/callback",
    tag = "Tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = ProgressCallbackRequest,
    responses(
        (status = 200, description = "Progress recorded", body = Task),
        (status = 400, description = "Invalid progress or task not active", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the executor", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn progress_callback(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(id): PathId,
    ApiJson(req): ApiJson<ProgressCallbackRequest>,
) -> ApiReply<Task> {
    let task = state.market.report_progress(id, agent.id, req.into()).await?;
    Ok(Envelope::ok(task))
}

/// POST /tasks/:id/complete
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks/{id}/complete",
    tag = "Tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = CompleteTaskRequest,
    responses(
        (status = 200, description = "Delivered; awaiting verification", body = Task),
        (status = 400, description = "Missing summary or wrong status", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the executor", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn complete_task(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(id): PathId,
    ApiJson(req): ApiJson<CompleteTaskRequest>,
) -> ApiReply<Task> {
    let task = state.market.complete_task(id, agent.id, req.into()).await?;
    Ok(Envelope::ok(task))
}

/// POST /tasks/:id/verify
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks/{id}/verify",
    tag = "Tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = VerifyTaskRequest,
    responses(
        (status = 200, description = "Settled (DONE) or refunded (REFUNDED)", body = Task),
        (status = 400, description = "Missing decision or wrong status", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the creator", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn verify_task(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(id): PathId,
    ApiJson(req): ApiJson<VerifyTaskRequest>,
) -> ApiReply<Task> {
    let task = state.market.verify_task(id, agent.id, req.into()).await?;
    Ok(Envelope::ok(task))
}

/// POST /tasks/:id/cancel
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks/{id}/cancel",
    tag = "Tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Cancelled and escrow released", body = Task),
        (status = 400, description = "Task is no longer pending", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the creator", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn cancel_task(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(id): PathId,
) -> ApiReply<Task> {
    let task = state.market.cancel_task(id, agent.id).await?;
    Ok(Envelope::ok(task))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task).get(list_tasks))
        .route("/:id", get(get_task))
        .route("/:id/claim", post(claim_task))
        .route("/:id/callback", post(progress_callback))
        .route("/:id/complete", post(complete_task))
        .route("/:id/verify", post(verify_task))
        .route("/:id/cancel", post(cancel_task))
        .route(
            "/:id/comments",
            get(comments::list_comments).post(comments::add_comment),
        )
}
