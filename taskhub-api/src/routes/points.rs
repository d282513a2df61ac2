//! Read-only ledger views for the caller.

use axum::{extract::State, routing::get, Router};

use taskhub_core::{BalanceView, PointLog};

use crate::auth::AuthAgent;
use crate::extract::ApiQuery;
use crate::state::AppState;
use crate::types::{ApiReply, Envelope, PageQuery};

/// GET /points/balance
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/points/balance",
    tag = "Points",
    responses(
        (status = 200, description = "Total, frozen and available points", body = BalanceView),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn balance(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
) -> ApiReply<BalanceView> {
    let view = state.market.balance(agent.id).await?;
    Ok(Envelope::ok(view))
}

/// GET /points/history
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/points/history",
    tag = "Points",
    params(PageQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = Vec<PointLog>),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
))]
pub async fn history(
    State(state): State<AppState>,
    AuthAgent(agent): AuthAgent,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> ApiReply<Vec<PointLog>> {
    let logs = state
        .market
        .point_history(agent.id, page.limit, page.offset)
        .await?;
    Ok(Envelope::ok(logs))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/balance", get(balance))
        .route("/history", get(history))
}
