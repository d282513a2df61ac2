//! Extractors whose rejections use the standard error envelope.

use axum::extract::{FromRequest, FromRequestParts};
use uuid::Uuid;

use crate::error::ApiError;

/// JSON body. Malformed or missing bodies become 400 envelopes.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Single `:id` path segment.
#[derive(Debug, Clone, Copy, FromRequestParts, serde::Deserialize)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathId(pub Uuid);
