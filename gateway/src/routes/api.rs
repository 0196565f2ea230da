use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api::health_check;
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}
