//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Webhook token mismatch or missing credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-success status from an upstream service (code host, model, registry)
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Upstream connection could not be established
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream asked us to back off
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Upstream call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether retrying the same call against the same upstream could
    /// plausibly succeed. Drives the shared retry policy: timeouts,
    /// connection failures, 429 and 5xx responses are worth another
    /// attempt; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout(_) | AppError::Unavailable(_) | AppError::RateLimited(_) => true,
            AppError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else if e.is_connect() {
            AppError::Unavailable(e.to_string())
        } else {
            AppError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", msg.clone()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database operation failed".to_string(),
            ),
            AppError::Migration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "MIGRATION_ERROR",
                "Database migration failed".to_string(),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Upstream { message, .. } => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                message.clone(),
            ),
            AppError::Unavailable(msg) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
                msg.clone(),
            ),
            AppError::RateLimited(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RATE_LIMITED",
                msg.clone(),
            ),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", msg.clone()),
            AppError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                "IO operation failed".to_string(),
            ),
            AppError::AddrParse(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ADDR_PARSE_ERROR",
                "Invalid address".to_string(),
            ),
            AppError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "JSON_ERROR",
                "Invalid JSON".to_string(),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        // Log the error
        tracing::error!(error = %self, code = code, "Request error");

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_covers_retryable_failures() {
        assert!(AppError::Timeout("deadline".into()).is_transient());
        assert!(AppError::Unavailable("connection refused".into()).is_transient());
        assert!(AppError::RateLimited("slow down".into()).is_transient());
        assert!(AppError::Upstream { status: 429, message: "throttled".into() }.is_transient());
        assert!(AppError::Upstream { status: 503, message: "maintenance".into() }.is_transient());
    }

    #[test]
    fn permanent_failures_are_not_transient() {
        assert!(!AppError::Upstream { status: 404, message: "gone".into() }.is_transient());
        assert!(!AppError::Upstream { status: 401, message: "bad token".into() }.is_transient());
        assert!(!AppError::Validation("empty project id".into()).is_transient());
        assert!(!AppError::Internal("bug".into()).is_transient());
    }
}
