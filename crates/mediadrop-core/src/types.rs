use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TaskError;

/// Every task id starts with this prefix.
pub const TASK_ID_PREFIX: &str = "dl_";

/// Upper bound on the length of a task id, prefix included.
pub const TASK_ID_MAX_LEN: usize = 64;

/// Validated identifier of a download task.
///
/// Holding a `TaskId` means the string has already been checked against
/// `dl_[A-Za-z0-9._]+`, so it is safe to join under the downloads root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Fresh id: prefix plus 64 random bits rendered as lowercase hex.
    pub fn generate() -> Self {
        let bytes: [u8; 8] = rand::random();
        TaskId(format!("{TASK_ID_PREFIX}{}", hex::encode(bytes)))
    }

    /// Validate an externally supplied id. Never touches the filesystem.
    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        if raw.len() > TASK_ID_MAX_LEN {
            return Err(TaskError::InvalidTaskId);
        }
        let suffix = raw
            .strip_prefix(TASK_ID_PREFIX)
            .ok_or(TaskError::InvalidTaskId)?;
        let valid = !suffix.is_empty()
            && suffix
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_');
        if valid {
            Ok(TaskId(raw.to_owned()))
        } else {
            Err(TaskError::InvalidTaskId)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TaskId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Extraction profile requested by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MediaKind {
    /// Best combined video + audio container.
    #[default]
    Video,
    /// Audio extracted and transcoded to mp3.
    Audio,
}

impl MediaKind {
    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        raw.trim()
            .parse()
            .map_err(|_| TaskError::InvalidKind(raw.to_owned()))
    }
}

/// Lifecycle state reported to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Downloading,
    Processing,
    Complete,
    Error,
    NotFound,
}

/// Contents of `task.json` inside a task directory.
///
/// Written once at submission with `status = downloading`; the supervisor
/// rewrites it exactly once more when the extractor exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub url: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: MediaKind,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            task_id,
            url: url.into(),
            kind,
            status: TaskStatus::Downloading,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            error: None,
        }
    }
}

/// How the final artifact is chosen when a directory holds several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ArtifactPolicy {
    /// First artifact in file-name order.
    #[default]
    First,
    /// Largest artifact by size; ties broken by name.
    Largest,
}
