//! Error Types for the TaskHub API
//!
//! Every failure leaves the server as the standard envelope
//! `{code, message, data: null}` where `code` equals the HTTP status.
//! `error` carries the machine-readable [`ErrorCode`].

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use taskhub_core::{MarketError, StorageError, ValidationError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error categories and their HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication (401, 403)
    Unauthorized,
    Forbidden,

    // Validation and business rules (400)
    ValidationFailed,
    InvalidInput,
    MissingField,
    StateConflict,
    InsufficientFunds,

    // Not found (404)
    EntityNotFound,

    // Server (500, 503)
    InternalError,
    DatabaseError,
    ServiceUnavailable,
    ConnectionPoolExhausted,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::StateConflict
            | ErrorCode::InsufficientFunds => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::StateConflict => "Operation conflicts with current state",
            ErrorCode::InsufficientFunds => "Insufficient available points",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Database connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Failure envelope. `data` is always null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub data: Option<serde_json::Value>,
    pub error: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.message,
            data: None,
            error: self.code,
            details: self.details,
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let message = err.to_string();
        match err {
            MarketError::Validation(ValidationError::RequiredFieldMissing { field }) => {
                ApiError::new(ErrorCode::MissingField, message)
                    .with_details(serde_json::json!({ "field": field }))
            }
            MarketError::Validation(ValidationError::InvalidValue { field, .. }) => {
                ApiError::new(ErrorCode::InvalidInput, message)
                    .with_details(serde_json::json!({ "field": field }))
            }
            MarketError::Validation(ValidationError::ConstraintViolation { constraint, .. }) => {
                ApiError::new(ErrorCode::ValidationFailed, message)
                    .with_details(serde_json::json!({ "constraint": constraint }))
            }
            MarketError::Unauthenticated { .. } => ApiError::unauthorized(message),
            MarketError::Forbidden { .. } => ApiError::forbidden(message),
            MarketError::Conflict(_) => ApiError::new(ErrorCode::StateConflict, message),
            MarketError::InsufficientFunds {
                available,
                requested,
                ..
            } => ApiError::new(ErrorCode::InsufficientFunds, message).with_details(
                serde_json::json!({ "available": available, "requested": requested }),
            ),
            MarketError::NotFound { .. } | MarketError::Storage(StorageError::NotFound { .. }) => {
                ApiError::not_found(message)
            }
            MarketError::Storage(storage) => {
                tracing::error!(error = %storage, "Storage failure");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
            MarketError::Internal { reason } => {
                tracing::error!(reason = %reason, "Internal failure");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ApiError::from_code(ErrorCode::DatabaseError)
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<crate::config::ConfigError> for ApiError {
    fn from(err: crate::config::ConfigError) -> Self {
        ApiError::invalid_input(format!("Invalid configuration: {}", err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
