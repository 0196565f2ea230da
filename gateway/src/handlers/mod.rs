//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `tts` - TTS WebSocket protocol (full and streaming synthesis)

pub mod api;
pub mod tts;

pub use tts::tts_ws_handler;
