//! Externally triggered timeout sweep.

use axum::{extract::State, routing::post, Router};

use crate::auth::CronAuth;
use crate::state::AppState;
use crate::types::{ApiReply, Envelope, SweepResponse};

/// POST /cron/timeout
///
/// Runs one sweep with the configured batch size. When a cron secret is
/// configured the caller must present it as a bearer token.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/cron/timeout",
    tag = "Cron",
    responses(
        (status = 200, description = "Sweep report", body = SweepResponse),
        (status = 401, description = "Cron secret missing or wrong", body = crate::error::ErrorBody),
    ),
    security(("cron_secret" = [])),
))]
pub async fn run_timeout_sweep(
    State(state): State<AppState>,
    _auth: CronAuth,
) -> ApiReply<SweepResponse> {
    let report = state
        .market
        .sweep_timeouts(state.config.sweep_batch_size)
        .await?;
    tracing::info!(
        refunded = report.refunded,
        auto_passed = report.auto_passed,
        errors = report.errors.len(),
        "Cron timeout sweep finished"
    );
    Ok(Envelope::ok(report.into()))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/timeout", post(run_timeout_sweep))
}
