//! Shared application state for all routes.

use crate::api::ApiRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Handlers generated by discovery. Read-only for the life of the server.
    pub registry: Arc<ApiRegistry>,
}

impl AppState {
    pub fn new(registry: ApiRegistry) -> Self {
        AppState {
            registry: Arc::new(registry),
        }
    }
}
