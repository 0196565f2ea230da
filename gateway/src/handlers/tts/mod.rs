//! TTS WebSocket handlers
//!
//! # Protocol
//!
//! Every frame is JSON text of the form `{"type": ..., "data": ...}`.
//!
//! ## Client → Server
//!
//! - **tts_request**: synthesize `text` and reply with one WAV payload
//! - **tts_stream_request**: synthesize `text` and reply with PCM chunks
//! - **ping**: liveness check
//!
//! ## Server → Client
//!
//! - **tts_response**: full result, or an error (`status: "error"`)
//! - **tts_stream_chunk**: base64 int16 PCM with `chunk_index` metadata
//! - **tts_stream_complete**: end of a successful stream
//! - **pong**: reply to `ping`, reports whether the engine is ready
//!
//! Requests on one connection are handled in arrival order. A failed request
//! produces an error reply and leaves the connection usable.

mod handler;
mod processor;

use bytes::Bytes;

use crate::protocol::OutgoingMessage;

pub use handler::tts_ws_handler;

/// Work items for the socket writer task.
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Ping(Bytes),
    Close,
}
