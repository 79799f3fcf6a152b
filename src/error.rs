// Error types for the commit streak service.
// Covers GitHub API failures, payload parsing, cache store failures, and request validation.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreakError {
    #[error("Missing GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("GitHub API request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("GitHub user not found: {0}")]
    UserNotFound(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed contribution date {value:?}: {source}")]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },

    #[error("Unexpected GitHub payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache store error: {0}")]
    Cache(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Coarse classification of a [`StreakError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Upstream,
    Parse,
    Cache,
    Validation,
    Internal,
}

impl StreakError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreakError::MissingToken | StreakError::Unauthorized => ErrorKind::Auth,
            StreakError::Api(_)
            | StreakError::Timeout(_)
            | StreakError::RateLimited { .. }
            | StreakError::UserNotFound(_)
            | StreakError::GraphQl(_)
            | StreakError::Http { .. } => ErrorKind::Upstream,
            StreakError::InvalidDate { .. } | StreakError::Payload(_) => ErrorKind::Parse,
            StreakError::Json(_) | StreakError::Io(_) | StreakError::Cache(_) => ErrorKind::Cache,
            StreakError::Validation(_) => ErrorKind::Validation,
            StreakError::Config(_) | StreakError::Server(_) => ErrorKind::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            StreakError::UserNotFound(_) => StatusCode::NOT_FOUND,
            StreakError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Auth | ErrorKind::Upstream | ErrorKind::Parse => StatusCode::BAD_GATEWAY,
                ErrorKind::Cache | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for StreakError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = ?self.kind(), "request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StreakError>;
