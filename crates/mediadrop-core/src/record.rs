//! The `task.json` state record kept inside every task directory.
//!
//! Its presence is what makes a task exist: a directory without a record is
//! reported as `not_found`.

use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;
use tracing::debug;

use crate::error::TaskError;
use crate::types::{TaskRecord, TaskStatus};

/// File name of the state record.
pub const RECORD_FILE: &str = "task.json";

/// Scratch name used while replacing the record.
pub const RECORD_TMP_FILE: &str = ".task.json.tmp";

/// Final outcome of an extractor run, as persisted by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Write `record` into `dir`, replacing any previous one atomically.
pub async fn write(dir: &Path, record: &TaskRecord) -> Result<(), TaskError> {
    let body = serde_json::to_vec(record)?;
    let tmp = dir.join(RECORD_TMP_FILE);
    tokio::fs::write(&tmp, &body).await?;
    tokio::fs::rename(&tmp, dir.join(RECORD_FILE)).await?;
    debug!(task_id = %record.task_id, status = %record.status, "task record written");
    Ok(())
}

/// Read the record of `dir`; `None` when the task was never created.
pub async fn read(dir: &Path) -> Result<Option<TaskRecord>, TaskError> {
    match tokio::fs::read(dir.join(RECORD_FILE)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Stamp the final outcome onto the existing record.
pub async fn finish(dir: &Path, outcome: Outcome) -> Result<TaskRecord, TaskError> {
    let mut record = read(dir)
        .await?
        .ok_or_else(|| TaskError::not_found(format!("record in {}", dir.display())))?;
    record.status = outcome.status;
    record.exit_code = outcome.exit_code;
    record.error = outcome.error;
    record.finished_at = Some(Utc::now());
    write(dir, &record).await?;
    Ok(record)
}
