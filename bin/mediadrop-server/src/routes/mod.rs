//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `MEDIADROP_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - Download task routes under `/v1`

pub mod doc;
mod health;
mod v1;

use crate::middleware::{cors, trace};
use crate::state::AppState;
use axum::{Router, middleware};
use std::sync::Arc;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/v1", v1::router());

    if state.config.enable_swagger {
        let swagger = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs());
        app = app.merge(swagger);
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
