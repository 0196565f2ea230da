//! WebSocket lifecycle for the TTS endpoint: upgrade, writer task, keepalive.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::middleware::connection_limit::SharedConnectionSlot;
use crate::protocol::OutgoingMessage;
use crate::state::AppState;

use super::MessageRoute;
use super::processor::{ConnectionContext, handle_text_message};

/// Outgoing queue depth per connection
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (16 MB)
const MAX_WS_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum WebSocket message size (16 MB)
pub(super) const MAX_WS_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// How long the writer may take to flush queued replies after the loop ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// TTS WebSocket handler
///
/// Upgrades the HTTP connection and serves the TTS protocol on it. The
/// connection slot reserved by the limit middleware moves into the socket
/// task and is released when the task ends.
pub async fn tts_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(slot): Extension<SharedConnectionSlot>,
) -> Response {
    let connection_id = Uuid::new_v4().to_string();
    info!(
        connection_id = %connection_id,
        ip = %slot.ip(),
        "TTS WebSocket connection upgrade requested"
    );

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            handle_tts_socket(socket, state, connection_id).await;
            drop(slot);
        })
}

async fn handle_tts_socket(socket: WebSocket, state: Arc<AppState>, connection_id: String) {
    info!(connection_id = %connection_id, "TTS WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    let writer_id = connection_id.clone();
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, MessageRoute::Close);

            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Ping(payload) => sender.send(Message::Ping(payload)).await,
                MessageRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!(connection_id = %writer_id, "Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let ctx = ConnectionContext {
        state: Arc::clone(&state),
        message_tx: message_tx.clone(),
        connection_id: connection_id.clone(),
    };

    let ping_timeout = state.config.ping_timeout();
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + state.config.ping_interval(),
        state.config.ping_interval(),
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Deadline for the pong answering our last keepalive ping
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let deadline = pong_deadline;
        tokio::select! {
            msg_result = receiver.next() => {
                // Any inbound traffic proves the peer is alive.
                pong_deadline = None;

                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_message(msg, &ctx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, "TTS WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(connection_id = %connection_id, "TTS WebSocket closed by client");
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if pong_deadline.is_none() {
                    if message_tx.send(MessageRoute::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    pong_deadline = Some(Instant::now() + ping_timeout);
                }
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                warn!(
                    connection_id = %connection_id,
                    "No pong within {}s, closing connection",
                    ping_timeout.as_secs()
                );
                break;
            }
        }
    }

    // Let queued replies go out before closing.
    let _ = message_tx.send(MessageRoute::Close).await;
    drop(ctx);
    drop(message_tx);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    info!(connection_id = %connection_id, "TTS WebSocket connection terminated");
}

/// Returns false when the connection should end.
async fn process_message(msg: Message, ctx: &ConnectionContext) -> bool {
    match msg {
        Message::Text(text) => {
            debug!(
                connection_id = %ctx.connection_id,
                "Received text message: {} bytes",
                text.len()
            );
            handle_text_message(text.as_str(), ctx).await
        }
        Message::Binary(data) => {
            warn!(
                connection_id = %ctx.connection_id,
                "Rejecting binary frame of {} bytes",
                data.len()
            );
            ctx.send(OutgoingMessage::error(
                "Binary frames are not supported; send JSON text messages",
            ))
            .await
        }
        Message::Ping(_) => {
            debug!("Received ping");
            true
        }
        Message::Pong(_) => {
            debug!("Received pong");
            true
        }
        Message::Close(_) => {
            info!(connection_id = %ctx.connection_id, "TTS WebSocket close received");
            false
        }
    }
}
