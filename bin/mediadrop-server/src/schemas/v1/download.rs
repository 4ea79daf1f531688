use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// Media page URL; surrounding whitespace is ignored.
    #[serde(default)]
    pub url: String,
    /// `video` (default) or `audio`.
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct ProgressQuery {
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    /// `downloading`, `processing`, `complete`, `error` or `not_found`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Relative link to `GET /v1/file` for the selected artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct FileQuery {
    #[serde(default)]
    pub task_id: String,
    /// File name as reported by the progress endpoint.
    #[serde(default)]
    pub file: String,
}
