use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
    pub tts_initialized: bool,
    pub active_connections: usize,
}

/// Liveness check for load balancers and the CLI.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        engine: state.synthesizer.name().to_string(),
        tts_initialized: state.tts_initialized(),
        active_connections: state.ws_connection_count(),
    })
}
