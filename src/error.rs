//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required collaborator or setting is missing or invalid.
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("connection: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("schema reader is not connected to a database")]
    NotConnected,
    #[error("command '{command}' rejected: {reason}")]
    DiscoverySafety { command: String, reason: String },
    #[error("translation: {0}")]
    Translation(String),
    #[error("row mapping failed for column '{column}': {message}")]
    RowMapping { column: String, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn translation(msg: impl Into<String>) -> Self {
        Error::Translation(msg.into())
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Error::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::Connection(_) | Error::NotConnected => (StatusCode::SERVICE_UNAVAILABLE, "connection_error"),
            Error::DiscoverySafety { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "unsafe_command"),
            Error::Translation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::RowMapping { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "row_mapping_error"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Io(_) | Error::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let details = match &self {
            Error::RowMapping { column, .. } => Some(serde_json::json!({ "column": column })),
            Error::DiscoverySafety { command, .. } => Some(serde_json::json!({ "command": command })),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
