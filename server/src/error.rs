//! Error types for the reconciliation server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the reconciliation server
#[derive(Debug, Error)]
pub enum Error {
    // Workspace errors (2000-2999)
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Workspace in invalid state: expected {expected}, got {actual}")]
    InvalidWorkspaceState { expected: String, actual: String },

    #[error("Workspace was modified concurrently: {0}")]
    StaleWorkspace(String),

    // Agent config errors (3000-3999)
    #[error("No workspaces agent config found for agent {agent_id} (version {version})")]
    AgentConfigNotFound { agent_id: String, version: String },

    #[error("Invalid workspaces agent config: {0}")]
    InvalidAgentConfig(String),

    // Config generation errors (4000-4999)
    #[error("Invalid devfile: {0}")]
    InvalidDevfile(String),

    #[error("Manifest generation failed: {0}")]
    ManifestGeneration(String),

    // Infrastructure errors (6000-6999)
    #[error("Database error: {0}")]
    DatabaseError(String),

    // General errors (1000-1999)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code
    pub fn code(&self) -> u32 {
        match self {
            // Workspace errors (2000-2999)
            Error::WorkspaceNotFound(_) => 2001,
            Error::InvalidWorkspaceState { .. } => 2002,
            Error::StaleWorkspace(_) => 2003,

            // Agent config errors (3000-3999)
            Error::AgentConfigNotFound { .. } => 3001,
            Error::InvalidAgentConfig(_) => 3002,

            // Config generation errors (4000-4999)
            Error::InvalidDevfile(_) => 4001,
            Error::ManifestGeneration(_) => 4002,

            // Infrastructure errors (6000-6999)
            Error::DatabaseError(_) => 6001,

            // General errors (1000-1999)
            Error::InvalidParameter(_) => 1002,
            Error::Internal(_) => 1003,
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::WorkspaceNotFound(_) | Error::AgentConfigNotFound { .. } => {
                StatusCode::NOT_FOUND
            }

            Error::StaleWorkspace(_) => StatusCode::CONFLICT,

            Error::InvalidParameter(_)
            | Error::InvalidWorkspaceState { .. }
            | Error::InvalidAgentConfig(_)
            | Error::InvalidDevfile(_) => StatusCode::BAD_REQUEST,

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

// Implement From for common error types
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidParameter(rejection.body_text())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ManifestGeneration(err.to_string())
    }
}
