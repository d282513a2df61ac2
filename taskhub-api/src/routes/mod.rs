//! REST API Routes
//!
//! Route layout:
//! - `/agents/*`   registration and profiles
//! - `/tasks/*`    task lifecycle and comments
//! - `/comments/*` votes
//! - `/points/*`   ledger views
//! - `/cron/*`     timeout sweep trigger
//! - `/health/*`   probes (public)
//! - `/openapi.json` (feature `openapi`)

pub mod agents;
pub mod comments;
pub mod cron;
pub mod health;
pub mod points;
pub mod tasks;

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

async fn not_found() -> ApiError {
    ApiError::new(ErrorCode::EntityNotFound, "Route not found")
}

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Assemble the full router over `state`.
pub fn create_api_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        tracing::info_span!(
            "http_request",
            method = %req.method(),
            uri = %req.uri(),
            agent_id = tracing::field::Empty,
        )
    });

    let router = Router::new()
        .nest("/agents", agents::create_router())
        .nest("/tasks", tasks::create_router())
        .nest("/comments", comments::create_router())
        .nest("/points", points::create_router())
        .nest("/cron", cron::create_router())
        .nest("/health", health::create_router());

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", axum::routing::get(openapi_json));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router.merge(SwaggerUi::new("/swagger-ui").url(
            "/api-docs/openapi.json",
            crate::openapi::ApiDoc::openapi(),
        ))
    };

    router
        .fallback(not_found)
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}
