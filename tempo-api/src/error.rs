//! Error Types for the Tempo API
//!
//! `ApiError` is the structured error response returned by every endpoint;
//! `ErrorCode` categorizes errors and carries the HTTP status mapping.
//! Domain errors (`ScheduleError`) convert losslessly into API errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tempo_core::ScheduleError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid caller identity
    Unauthorized,

    /// Caller is known but does not own the resource
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// `fromDateMs` is after `toDateMs`
    InvalidDateRange,

    /// Split point would produce an undersized or empty part
    InvalidSplitPoint,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// User has no availability rules configured
    AvailabilityNotFound,

    /// Requested schedule plan does not exist
    PlanNotFound,

    /// Requested schedule event does not exist
    EventNotFound,

    /// Requested schedule task does not exist
    TaskNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// A proposed plan already exists for this user/algorithm
    ProposedPlanAlreadyExists,

    /// Operation conflicts with current plan/event state
    StateConflict,

    /// Concurrent modification detected (optimistic locking failure)
    ConcurrentModification,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidDateRange
            | ErrorCode::InvalidSplitPoint => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::AvailabilityNotFound
            | ErrorCode::PlanNotFound
            | ErrorCode::EventNotFound
            | ErrorCode::TaskNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ProposedPlanAlreadyExists
            | ErrorCode::StateConflict
            | ErrorCode::ConcurrentModification => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derive(utoipa::ToSchema)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
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

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_date_range(from_ms: i64, to_ms: i64) -> Self {
        Self::new(
            ErrorCode::InvalidDateRange,
            format!("fromDateMs {} is after toDateMs {}", from_ms, to_ms),
        )
    }

    pub fn plan_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::PlanNotFound, format!("Plan {} not found", id))
    }

    pub fn event_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EventNotFound, format!("Event {} not found", id))
    }

    pub fn task_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::TaskNotFound, format!("Task {} not found", id))
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn proposed_plan_already_exists() -> Self {
        Self::new(
            ErrorCode::ProposedPlanAlreadyExists,
            "A proposed plan already exists; apply or discard it first",
        )
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
        Self::new(
            ErrorCode::ConnectionPoolExhausted,
            "Connection pool exhausted",
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Map domain errors onto API error codes.
impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Validation { reason } => {
                ApiError::new(ErrorCode::ValidationFailed, reason)
            }
            ScheduleError::NotFound { entity } => {
                let code = match entity {
                    "schedule plan" => ErrorCode::PlanNotFound,
                    "schedule event" => ErrorCode::EventNotFound,
                    "schedule task" => ErrorCode::TaskNotFound,
                    "availability" => ErrorCode::AvailabilityNotFound,
                    _ => ErrorCode::EntityNotFound,
                };
                ApiError::new(code, format!("{} not found", entity))
            }
            ScheduleError::Forbidden { reason } => ApiError::new(ErrorCode::Forbidden, reason),
            ScheduleError::Conflict { reason } => {
                if reason.contains("proposed plan") {
                    ApiError::new(ErrorCode::ProposedPlanAlreadyExists, reason)
                } else {
                    ApiError::new(ErrorCode::StateConflict, reason)
                }
            }
            ScheduleError::InvalidTransition { from, to } => ApiError::new(
                ErrorCode::StateConflict,
                format!("invalid transition from {} to {}", from, to),
            ),
            ScheduleError::InvalidSplitPoint => ApiError::new(
                ErrorCode::InvalidSplitPoint,
                "split point would create a part below the minimum duration",
            ),
            ScheduleError::Storage { reason } => {
                tracing::error!(reason = %reason, "storage error");
                ApiError::database_error("Database operation failed")
            }
            ScheduleError::Executor { reason } => {
                ApiError::new(ErrorCode::ServiceUnavailable, reason)
            }
        }
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        // Generic message to avoid leaking internals.
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
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

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
