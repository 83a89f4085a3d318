use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("source folder not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("document index is not available")]
    IndexUnavailable,
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool `{tool}` failed: {message}")]
    ToolExecution { tool: String, message: String },
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn tool<E: std::fmt::Display>(tool: impl Into<String>, err: E) -> Self {
        ApiError::ToolExecution {
            tool: tool.into(),
            message: err.to_string(),
        }
    }

    pub fn model<E: std::fmt::Display>(err: E) -> Self {
        ApiError::ModelInvocation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::IndexUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ModelInvocation(_) => StatusCode::BAD_GATEWAY,
            ApiError::UnknownTool(_)
            | ApiError::ToolExecution { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
