use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON bodies below this size are logged; nothing else is ever buffered.
const MAX_LOGGED_BODY: u64 = 1024;

pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();
        let body = log_body("request", &parts.headers, body).await;
        let mut req = Request::from_parts(parts, body);
        if let Some(value) = &trace_header {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }

        let response = next.run(req).await;

        let (parts, body) = response.into_parts();
        let body = log_body("response", &parts.headers, body).await;
        let mut response = Response::from_parts(parts, body);
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Log small JSON bodies; every other body is passed through untouched so
/// file downloads keep streaming.
async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Body {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_json = content_type.contains("application/json");
    let hint = body.size_hint();
    let small = hint.upper().is_some_and(|n| n < MAX_LOGGED_BODY);

    if !(is_json && small) {
        if let Some(len) = hint.exact().filter(|n| *n > 0) {
            debug!(direction, content_type, len, "body not logged");
        }
        return body;
    }

    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            if let Ok(text) = std::str::from_utf8(&bytes) {
                if !text.is_empty() {
                    info!(direction, body = %text, "json body");
                }
            }
            Body::from(bytes)
        }
        Err(e) => {
            warn!(direction, error = %e, "failed to read body");
            Body::empty()
        }
    }
}
