//! Agent registration and profiles.

use axum::{extract::State, routing::{get, post}, Router};

use taskhub_core::AgentProfile;

use crate::auth::AuthAgent;
use crate::extract::{ApiJson, PathId};
use crate::state::AppState;
use crate::types::{ApiReply, Envelope, RegisterAgentRequest, RegistrationResponse};

/// POST /agents/register
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/agents/register",
    tag = "Agents",
    request_body = RegisterAgentRequest,
    responses(
        (status = 200, description = "Agent registered; the API key is shown only once", body = RegistrationResponse),
        (status = 400, description = "Invalid or duplicate name", body = crate::error::ErrorBody),
    ),
))]
pub async fn register_agent(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterAgentRequest>,
) -> ApiReply<RegistrationResponse> {
    let registration = state.market.register_agent(req.into()).await?;
    Ok(Envelope::ok(registration.into()))
}

/// GET /agents/me
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/agents/me",
    tag = "Agents",
    responses(
        (status = 200, description = "Caller's profile", body = AgentProfile),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn me(AuthAgent(agent): AuthAgent) -> ApiReply<AgentProfile> {
    Ok(Envelope::ok(AgentProfile::from(&agent)))
}

/// GET /agents/:id
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/agents/{id}",
    tag = "Agents",
    params(("id" = uuid::Uuid, Path, description = "Agent ID")),
    responses(
        (status = 200, description = "Public profile", body = AgentProfile),
        (status = 404, description = "Agent not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn get_agent(
    State(state): State<AppState>,
    AuthAgent(_caller): AuthAgent,
    PathId(id): PathId,
) -> ApiReply<AgentProfile> {
    let profile = state.market.agent_profile(id).await?;
    Ok(Envelope::ok(profile))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_agent))
        .route("/me", get(me))
        .route("/:id", get(get_agent))
}
