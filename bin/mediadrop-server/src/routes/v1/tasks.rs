//! Control of running tasks.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::task::CancelResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(cancel_task), components(schemas(CancelResponse)))]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/{task_id}/cancel", post(cancel_task))
}

/// Stop the extractor of a running task. The poll reports `error` with
/// `cancelled` once it has exited.
#[utoipa::path(
    post,
    path = "/v1/tasks/{task_id}/cancel",
    tag = "tasks",
    params(
        ("task_id" = String, Path, description = "ID of the task to cancel")
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = CancelResponse),
        (status = 400, description = "Invalid task ID"),
        (status = 409, description = "Task is not running"),
    )
)]
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, ServerError> {
    if !state.service.cancel(&task_id)? {
        return Err(ServerError::Conflict(format!("task {task_id} is not running")));
    }
    Ok(Json(CancelResponse { task_id, status: "cancelling".into() }))
}
