//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a `{"error": "..."}`
//! JSON body with a matching status code.
//!
//! Internal errors (I/O, JSON) are logged with full detail but the caller only
//! gets a generic message, so paths and tool output never leak.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mediadrop_core::TaskError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur in the mediadrop-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the task service.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with the current state of the task.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            ServerError::Task(e) => match e {
                TaskError::InvalidTaskId
                | TaskError::InvalidUrl
                | TaskError::InvalidKind(_)
                | TaskError::InvalidFilename => (StatusCode::BAD_REQUEST, e.to_string()),
                TaskError::AccessDenied => {
                    warn!("access denied while serving a file");
                    (StatusCode::FORBIDDEN, e.to_string())
                }
                TaskError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                TaskError::AlreadyRunning(_) => (StatusCode::CONFLICT, e.to_string()),
                TaskError::Launch { program, source } => {
                    error!(
                        program = %program.display(),
                        error = %source,
                        "extractor launch failed"
                    );
                    (StatusCode::BAD_GATEWAY, "failed to start downloader".to_owned())
                }
                TaskError::Probe(m) => (StatusCode::BAD_GATEWAY, m.clone()),
                TaskError::Io(_) | TaskError::Json(_) => {
                    error!(error = %e, "task storage error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
                }
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = self.status_and_message();
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}
