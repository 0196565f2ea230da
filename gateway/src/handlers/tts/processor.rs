//! Request processing for the TTS WebSocket protocol.

use std::sync::Arc;

use base64::prelude::*;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::tts::{AudioFormat, wav};
use crate::protocol::{
    AudioMetadata, ChunkMetadata, IncomingMessage, OutgoingMessage, SynthesisRequestData,
    ValidatedRequest,
};
use crate::state::AppState;

use super::MessageRoute;
use super::handler::MAX_WS_MESSAGE_SIZE;

/// Room left in a `tts_response` frame for the JSON envelope and metadata
const RESPONSE_ENVELOPE_BYTES: usize = 4 * 1024;

/// Per-connection handles shared by all request handlers.
pub struct ConnectionContext {
    pub state: Arc<AppState>,
    pub message_tx: mpsc::Sender<MessageRoute>,
    pub connection_id: String,
}

impl ConnectionContext {
    /// Queue a reply. Returns false once the writer has gone away.
    pub async fn send(&self, message: OutgoingMessage) -> bool {
        self.message_tx
            .send(MessageRoute::Outgoing(message))
            .await
            .is_ok()
    }

    async fn send_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        warn!(connection_id = %self.connection_id, "Request failed: {}", message);
        self.send(OutgoingMessage::error(message)).await
    }

    fn validate(&self, data: &SynthesisRequestData) -> Result<ValidatedRequest, String> {
        data.validate(
            &self.state.config.synthesis,
            self.state.config.max_text_length,
        )
        .map_err(|e| e.to_string())
    }
}

/// Decode and dispatch one client text frame.
///
/// Returns false when the connection should end.
pub async fn handle_text_message(text: &str, ctx: &ConnectionContext) -> bool {
    let message = match IncomingMessage::parse(text) {
        Ok(message) => message,
        Err(e) => return ctx.send_error(e.to_string()).await,
    };

    debug!(
        connection_id = %ctx.connection_id,
        message_type = message.message_type(),
        "Dispatching message"
    );

    match message {
        IncomingMessage::TtsRequest(data) => handle_tts_request(&data, ctx).await,
        IncomingMessage::TtsStreamRequest(data) => handle_stream_request(&data, ctx).await,
        IncomingMessage::Ping(_) => {
            ctx.send(OutgoingMessage::pong(ctx.state.tts_initialized()))
                .await
        }
    }
}

/// Full synthesis: one `tts_response` carrying a WAV payload.
async fn handle_tts_request(data: &SynthesisRequestData, ctx: &ConnectionContext) -> bool {
    let request = match ctx.validate(data) {
        Ok(request) => request,
        Err(message) => return ctx.send_error(message).await,
    };

    info!(
        connection_id = %ctx.connection_id,
        chars = request.text.chars().count(),
        language = %request.config.language,
        emotion = %request.config.emotion,
        "Generating speech"
    );

    let permit = match ctx.state.acquire_generation().await {
        Ok(permit) => permit,
        Err(e) => return ctx.send_error(format!("Generation error: {e}")).await,
    };

    let synthesis = tokio::time::timeout(
        ctx.state.config.generation_timeout(),
        ctx.state.synthesizer.synthesize(
            &request.text,
            &request.config,
            request.reference_audio.as_deref(),
        ),
    )
    .await;
    drop(permit);

    let audio = match synthesis {
        Ok(Ok(audio)) => audio,
        Ok(Err(e)) => {
            error!(connection_id = %ctx.connection_id, "Synthesis failed: {}", e);
            return ctx.send_error(format!("Generation error: {e}")).await;
        }
        Err(_) => return ctx.send_error("Generation timeout").await,
    };

    if audio.samples.is_empty() {
        return ctx.send_error("Generation error: no audio generated").await;
    }

    let wav_bytes = match wav::encode_wav(&audio.samples, audio.format) {
        Ok(bytes) => bytes,
        Err(e) => return ctx.send_error(format!("Generation error: {e}")).await,
    };

    let encoded_len = wav_bytes.len().div_ceil(3) * 4;
    if encoded_len + RESPONSE_ENVELOPE_BYTES > MAX_WS_MESSAGE_SIZE {
        return ctx
            .send_error(format!(
                "Generation error: audio too large for a single response ({} bytes), use tts_stream_request",
                wav_bytes.len()
            ))
            .await;
    }

    let metadata = AudioMetadata {
        duration: audio.duration(),
        sample_rate: audio.format.sample_rate,
        channels: audio.format.channels,
        language: request.config.language,
        emotion: request.config.emotion,
        speed: request.config.speed,
    };

    info!(
        connection_id = %ctx.connection_id,
        duration = metadata.duration,
        bytes = wav_bytes.len(),
        "Speech generated"
    );

    ctx.send(OutgoingMessage::success(
        BASE64_STANDARD.encode(&wav_bytes),
        metadata,
    ))
    .await
}

/// Streaming synthesis: ordered `tts_stream_chunk` messages, then one
/// `tts_stream_complete`. Any failure ends the stream with an error reply and
/// no completion message.
async fn handle_stream_request(data: &SynthesisRequestData, ctx: &ConnectionContext) -> bool {
    let request = match ctx.validate(data) {
        Ok(request) => request,
        Err(message) => return ctx.send_error(message).await,
    };

    info!(
        connection_id = %ctx.connection_id,
        chars = request.text.chars().count(),
        chunk_size = request.config.chunk_size,
        "Streaming speech"
    );

    // Held until the stream is drained so the engine is never oversubscribed.
    let _permit = match ctx.state.acquire_generation().await {
        Ok(permit) => permit,
        Err(e) => return ctx.send_error(format!("Generation error: {e}")).await,
    };

    let chunk_timeout = ctx.state.config.chunk_timeout();
    let max_chunk_bytes = ctx.state.config.ws_max_chunk_size;

    let mut stream = match tokio::time::timeout(
        chunk_timeout,
        ctx.state.synthesizer.synthesize_stream(
            &request.text,
            &request.config,
            request.reference_audio.as_deref(),
        ),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return ctx.send_error(format!("Generation error: {e}")).await,
        Err(_) => return ctx.send_error("Generation timeout").await,
    };

    let mut chunk_index: u32 = 0;
    let mut total_duration = 0.0;

    loop {
        let chunk = match tokio::time::timeout(chunk_timeout, stream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                error!(connection_id = %ctx.connection_id, "Stream failed: {}", e);
                return ctx.send_error(format!("Generation error: {e}")).await;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    connection_id = %ctx.connection_id,
                    chunks = chunk_index,
                    "No chunk within {}s",
                    chunk_timeout.as_secs()
                );
                return ctx.send_error("Generation timeout").await;
            }
        };

        for piece in split_samples(&chunk.samples, chunk.format, max_chunk_bytes) {
            let bytes = wav::pcm_to_le_bytes(piece);
            let duration = chunk.format.duration_of(piece.len());
            let metadata = ChunkMetadata {
                chunk_index,
                chunk_size: bytes.len(),
                duration,
                sample_rate: chunk.format.sample_rate,
                channels: chunk.format.channels,
            };

            if !ctx
                .send(OutgoingMessage::chunk(BASE64_STANDARD.encode(&bytes), metadata))
                .await
            {
                return false;
            }
            chunk_index += 1;
            total_duration += duration;
        }
    }

    info!(
        connection_id = %ctx.connection_id,
        chunks = chunk_index,
        duration = total_duration,
        "Streaming complete"
    );

    ctx.send(OutgoingMessage::complete(chunk_index, total_duration))
        .await
}

/// Split PCM into pieces whose encoded size stays within `max_bytes`,
/// cutting only on whole-frame boundaries. Empty input yields nothing.
fn split_samples(samples: &[i16], format: AudioFormat, max_bytes: usize) -> Vec<&[i16]> {
    let channels = format.channels.max(1) as usize;
    let frames_per_piece = (max_bytes / format.bytes_per_frame()).max(1);
    samples.chunks(frames_per_piece * channels).collect()
}
