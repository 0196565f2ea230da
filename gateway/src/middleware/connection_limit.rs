//! Connection limit middleware for the TTS WebSocket endpoint
//!
//! Enforces a global cap on concurrent WebSocket sessions and a per-IP cap.
//! A successful check reserves a [`ConnectionSlot`] and hands it to the
//! handler as a request extension. The slot lives as long as the socket and
//! frees itself when dropped, including when the upgrade never completes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::state::{AppState, ConnectionLimitError, ConnectionSlot};

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Reject WebSocket upgrades beyond the configured limits.
///
/// Returns 503 when the server-wide limit is reached and 429 when the
/// caller's IP already holds its maximum. Plain HTTP requests pass through.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    let client_ip = addr.ip();
    match state.try_acquire_connection(client_ip) {
        Ok(slot) => {
            request.extensions_mut().insert(Arc::new(slot));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            warn!(ip = %client_ip, "Rejecting connection: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            warn!(ip = %client_ip, "Rejecting connection: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}

/// Extension type inserted for accepted upgrades.
pub type SharedConnectionSlot = Arc<ConnectionSlot>;

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_upgrade(value: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/ws");
        if let Some(value) = value {
            builder = builder.header(header::UPGRADE, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_upgrade_detection() {
        assert!(is_websocket_upgrade(&request_with_upgrade(Some("websocket"))));
        assert!(is_websocket_upgrade(&request_with_upgrade(Some("WebSocket"))));
        assert!(!is_websocket_upgrade(&request_with_upgrade(Some("h2c"))));
        assert!(!is_websocket_upgrade(&request_with_upgrade(None)));
    }
}
