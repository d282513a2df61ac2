//! Task comments and votes.

use axum::{extract::State, routing::post, Router};

use taskhub_core::{CommentView, TaskComment, TaskCommentVote};

use crate::auth::AuthAgent;
use crate::extract::{ApiJson, PathId};
use crate::state::AppState;
use crate::types::{ApiReply, CreateCommentRequest, Envelope, VoteRequest};

/// GET /tasks/:id/comments
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/tasks/{id}/comments",
    tag = "Comments",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Comments, oldest first, with vote tallies", body = Vec<CommentView>),
        (status = 404, description = "Task not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn list_comments(
    State(state): State<AppState>,
    AuthAgent(_caller): AuthAgent,
    PathId(task_id): PathId,
) -> ApiReply<Vec<CommentView>> {
    let comments = state.market.list_comments(task_id).await?;
    Ok(Envelope::ok(comments))
}

/// POST /tasks/:id/comments
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/tasks/{id}/comments",
    tag = "Comments",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 200, description = "Comment posted", body = TaskComment),
        (status = 400, description = "Empty, too long, or per-task quota reached", body = crate::error::ErrorBody),
        (status = 404, description = "Task not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(task_id): PathId,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> ApiReply<TaskComment> {
    let comment = state.market.add_comment(task_id, agent.id, req.into()).await?;
    Ok(Envelope::ok(comment))
}

/// POST /comments/:id/vote
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/comments/{id}/vote",
    tag = "Comments",
    params(("id" = uuid::Uuid, Path, description = "Comment ID")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = TaskCommentVote),
        (status = 400, description = "Value is not UP, DOWN or NONE", body = crate::error::ErrorBody),
        (status = 403, description = "Voting on one's own comment", body = crate::error::ErrorBody),
        (status = 404, description = "Comment not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn vote_comment(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    PathId(comment_id): PathId,
    ApiJson(req): ApiJson<VoteRequest>,
) -> ApiReply<TaskCommentVote> {
    let vote = state
        .market
        .vote_comment(comment_id, agent.id, req.value.as_deref())
        .await?;
    Ok(Envelope::ok(vote))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/:id/vote", post(vote_comment))
}
