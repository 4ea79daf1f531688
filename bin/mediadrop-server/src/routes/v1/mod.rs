pub mod download;
pub mod files;
pub mod info;
pub mod tasks;

use crate::state::AppState;
use utoipa::OpenApi;

use axum::Router;
use std::sync::Arc;

/// Routes nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(download::router())
        .merge(files::router())
        .merge(info::router())
        .merge(tasks::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct V1Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = V1Api::openapi();
    spec.merge(download::DownloadApi::openapi());
    spec.merge(files::FilesApi::openapi());
    spec.merge(info::InfoApi::openapi());
    spec.merge(tasks::TasksApi::openapi());
    spec
}
