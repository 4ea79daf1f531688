//! Task submission and progress polling.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use mediadrop_core::delivery::encode_component;
use mediadrop_core::{MediaKind, TaskProgress, TaskStatus};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::download::{ProgressQuery, ProgressResponse, SubmitRequest, SubmitResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(submit, progress),
    components(schemas(SubmitRequest, SubmitResponse, ProgressResponse))
)]
pub struct DownloadApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/download", post(submit))
        .route("/progress", get(progress))
}

#[utoipa::path(
    post,
    path = "/v1/download",
    tag = "download",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Download started", body = SubmitResponse),
        (status = 400, description = "Empty URL or unknown type"),
        (status = 502, description = "Extractor could not be started"),
    )
)]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let kind = match req.kind.as_deref() {
        Some(raw) => MediaKind::parse(raw)?,
        None => MediaKind::default(),
    };

    let submitted = state.service.submit(&req.url, kind).await?;
    Ok(Json(SubmitResponse {
        task_id: submitted.task_id.to_string(),
        status: submitted.status.to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/progress",
    tag = "download",
    params(ProgressQuery),
    responses(
        (status = 200, description = "Current task state", body = ProgressResponse),
        (status = 400, description = "Invalid task ID"),
    )
)]
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ProgressQuery>,
) -> Result<Json<ProgressResponse>, ServerError> {
    let progress = state.service.poll(&q.task_id).await?;
    Ok(Json(to_response(&q.task_id, progress)))
}

fn to_response(task_id: &str, progress: TaskProgress) -> ProgressResponse {
    let download_url = match (&progress.status, &progress.filename) {
        (TaskStatus::Complete, Some(name)) => Some(format!(
            "/v1/file?task_id={}&file={}",
            encode_component(task_id),
            encode_component(name)
        )),
        _ => None,
    };
    ProgressResponse {
        status: progress.status.to_string(),
        percent: progress.percent,
        filename: progress.filename,
        download_url,
        artifacts: progress.artifacts,
        error: progress.error,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn complete_progress_links_to_file() {
        let progress = TaskProgress {
            status: TaskStatus::Complete,
            percent: None,
            filename: Some("My Clip [1080p].mp4".into()),
            artifacts: vec!["My Clip [1080p].mp4".into()],
            error: None,
        };
        let response = to_response("dl_abc", progress);
        assert_eq!(response.status, "complete");
        assert_eq!(
            response.download_url.as_deref(),
            Some("/v1/file?task_id=dl_abc&file=My%20Clip%20%5B1080p%5D.mp4")
        );
    }

    #[test]
    fn not_found_serializes_status_only() {
        let response = to_response("dl_abc", TaskProgress::not_found());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "not_found" }));
    }
}
