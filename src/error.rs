use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote API (GitHub, the LLM) answered with a non-success status
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The coding-agent job could not be run to completion
    #[error("Job failed: {0}")]
    Job(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Upstream(_) | AppError::Http(_) | AppError::Job(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_type = match self {
            AppError::NotFound(_) => "NotFound",
            AppError::Validation(_) => "ValidationError",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Database(_) => "DatabaseError",
            AppError::Http(_) => "HttpError",
            AppError::Upstream(_) => "UpstreamError",
            AppError::Job(_) => "JobError",
            AppError::Internal(_) => "InternalError",
        };

        let response = ErrorResponse {
            error: ErrorDetail {
                error_type: error_type.to_string(),
                message: self.to_string(),
            },
        };

        HttpResponse::build(self.status_code()).json(response)
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;
