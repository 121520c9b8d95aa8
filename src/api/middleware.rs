use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Blank question or other unusable input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A statement that is not read-only. Never executed.
    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    /// Model unreachable, timed out, not configured or produced unusable text
    #[error("LLM service error: {0}")]
    LlmService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl AppError {
    /// True when the store reported that the referenced relation is missing
    pub fn is_missing_relation(&self) -> bool {
        match self {
            AppError::Database(msg) => {
                msg.contains("42P01") || (msg.contains("relation") && msg.contains("does not exist"))
            }
            _ => false,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg),
            ),
            AppError::InvalidSql(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SQL", msg)
                    .with_details("Only SELECT queries are allowed for security reasons."),
            ),
            AppError::LlmService(msg) => {
                let detail = ErrorDetail::new("LLM_SERVICE_ERROR", msg.clone());
                let detail = if msg.contains("not configured") {
                    detail.with_details("Set LLM_API_KEY (and optionally LLM_GATEWAY_URL) to enable the language model.")
                } else {
                    detail
                };
                (StatusCode::BAD_GATEWAY, detail)
            }
            AppError::Database(msg) => {
                // Provide actionable suggestions for database errors
                let detail = ErrorDetail::new("DATABASE_ERROR", msg.clone());
                let detail = if msg.contains("does not exist") {
                    detail.with_details("Check that the table name is correct or refresh the schema.")
                } else if msg.contains("timeout") {
                    detail.with_details("Consider simplifying your question or checking database performance.")
                } else {
                    detail
                };
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
            AppError::Connection(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("CONNECTION_ERROR", msg),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        let details = match err.as_db_error() {
            Some(db_error) => format!(
                "Code: {}, Message: {}",
                db_error.code().code(),
                db_error.message()
            ),
            None => err.to_string(),
        };
        AppError::Database(details)
    }
}
