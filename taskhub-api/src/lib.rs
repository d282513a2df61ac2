//! TaskHub API
//!
//! HTTP surface for the TaskHub marketplace:
//! - Axum routes wrapping every market operation in the `{code, message, data}` envelope
//! - Bearer API-key authentication and the cron secret guard
//! - The Postgres implementation of the market store
//! - The background timeout sweeper
//! - OpenAPI document (feature `openapi`)

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod extract;
pub mod jobs;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use auth::{AuthAgent, CronAuth};
pub use config::{ApiConfig, ConfigError, LogFormat, StoreKind};
pub use db::{run_migrations, DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{timeout_sweep_task, TimeoutSweepConfig, TimeoutSweepMetrics};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::{ApiReply, Envelope};
