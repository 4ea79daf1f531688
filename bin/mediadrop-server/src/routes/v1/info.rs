//! Metadata lookup for a media URL.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::info::{FormatResponse, InfoRequest, InfoResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_info), components(schemas(InfoRequest, InfoResponse, FormatResponse)))]
pub struct InfoApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/info", post(get_info))
}

#[utoipa::path(
    post,
    path = "/v1/info",
    tag = "info",
    request_body = InfoRequest,
    responses(
        (status = 200, description = "Media metadata", body = InfoResponse),
        (status = 400, description = "Empty URL"),
        (status = 502, description = "Extractor failed or produced no metadata"),
    )
)]
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<InfoResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let info = state.service.probe(&req.url).await?;
    Ok(Json(info.into()))
}
