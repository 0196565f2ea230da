pub mod api;
pub mod ws;

use std::sync::Arc;

use axum::{Router, middleware};

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Assemble the full application router.
///
/// The WebSocket routes sit behind the connection limit middleware, which
/// needs `ConnectInfo<SocketAddr>`: serve the result with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let ws_routes = ws::create_ws_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    Router::new()
        .merge(ws_routes)
        .merge(api::create_api_router())
        .with_state(state)
}
