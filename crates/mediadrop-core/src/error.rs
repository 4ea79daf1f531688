use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by task allocation, launch, inspection and delivery.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The identifier does not match `dl_[A-Za-z0-9._]+` or is too long.
    #[error("Invalid task ID")]
    InvalidTaskId,

    /// The submitted URL was empty after trimming.
    #[error("Please enter a URL")]
    InvalidUrl,

    /// The requested extraction profile is not `video` or `audio`.
    #[error("unsupported media kind '{0}'")]
    InvalidKind(String),

    /// The requested file name is empty or reduces to nothing.
    #[error("Invalid filename")]
    InvalidFilename,

    /// The requested file would resolve outside its task directory.
    #[error("Access denied")]
    AccessDenied,

    /// Unknown task or missing file.
    #[error("not found: {0}")]
    NotFound(String),

    /// A process is already registered for this task.
    #[error("task {0} already has a running extractor")]
    AlreadyRunning(String),

    /// The extractor binary could not be started.
    #[error("failed to start {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata probe ran but produced nothing usable.
    #[error("{0}")]
    Probe(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TaskError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        TaskError::NotFound(what.into())
    }
}
