//! Streams finished artifacts to the client.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use mediadrop_core::TaskError;
use tokio_util::io::ReaderStream;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::download::FileQuery;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_file))]
pub struct FilesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/file", get(get_file))
}

#[utoipa::path(
    get,
    path = "/v1/file",
    tag = "download",
    params(FileQuery),
    responses(
        (
            status = 200,
            description = "File contents",
            body = Vec<u8>,
            content_type = "application/octet-stream"
        ),
        (status = 400, description = "Invalid task ID or file name"),
        (status = 403, description = "Path escapes the task directory"),
        (status = 404, description = "Unknown task or file"),
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FileQuery>,
) -> Result<Response, ServerError> {
    let served = state.service.open(&q.task_id, &q.file).await?;
    let file = tokio::fs::File::open(&served.path)
        .await
        .map_err(TaskError::from)?;
    info!(
        task_id = %served.task_id,
        filename = %served.filename,
        len = served.len,
        content_type = %served.content_type,
        "serving file"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &served.content_type)
        .header(header::CONTENT_LENGTH, served.len)
        .header(header::CONTENT_DISPOSITION, served.content_disposition())
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ServerError::Internal(format!("failed to build file response: {e}")))
}
