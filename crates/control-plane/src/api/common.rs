// Common DTOs for public API
//
// These types are shared across the task and worker endpoints.
// Decision: Every error body is {"error": "<reason>"}

use axum::http::StatusCode;
use axum::Json;
use noscope_durable::{ControllerError, ServiceError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error tuple returned by handlers
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    #[schema(example = "object_id must not be empty")]
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> ApiError {
        (status, Json(self))
    }
}

/// Map a task service error to its HTTP status
pub fn service_error(err: ServiceError) -> ApiError {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::InvalidTransition(_) => {
            tracing::error!("Invalid task transition reached the API: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::Store(_) => {
            tracing::error!("Task store failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    ErrorResponse::new(err.to_string()).into_response(status)
}

/// Map a worker controller error to its HTTP status
pub fn controller_error(err: ControllerError) -> ApiError {
    let status = if err.is_conflict() {
        StatusCode::CONFLICT
    } else {
        tracing::error!("Worker lifecycle operation failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    ErrorResponse::new(err.to_string()).into_response(status)
}
