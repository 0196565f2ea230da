//! TTS WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::tts_ws_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the TTS WebSocket router
///
/// # Endpoints
///
/// - `GET /` - WebSocket upgrade, the path F5-TTS style clients connect to
/// - `GET /ws` - same handler under an explicit path
///
/// # Example
///
/// ```json
/// // Client sends
/// {"type": "tts_request", "data": {"text": "Hola", "config": {"language": "spanish"}}}
///
/// // Server responds
/// {"type": "tts_response", "data": {"audio": "<base64 wav>", "status": "success", "message": "Audio generated successfully", "metadata": {...}}}
/// ```
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(tts_ws_handler))
        .route("/ws", get(tts_ws_handler))
        .layer(TraceLayer::new_for_http())
}
