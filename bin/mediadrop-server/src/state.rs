//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use mediadrop_core::TaskService;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Task allocation, supervision, polling and delivery.
    pub service: Arc<TaskService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let service = TaskService::new(config.service_config());
        Self { config: Arc::new(config), service: Arc::new(service) }
    }
}
