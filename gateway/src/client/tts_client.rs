//! WebSocket client for the TTS gateway.
//!
//! The client is sequential: every call sends one request and consumes the
//! replies belonging to it before returning. Lost connections are
//! re-established with bounded backoff, and a request that has not produced
//! any output yet is sent once more on the new connection.

use std::time::Duration;

use base64::prelude::*;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::core::tts::{AudioFormat, wav::pcm_from_le_bytes};
use crate::protocol::{
    AudioMetadata, ChunkMetadata, IncomingMessage, OutgoingMessage, PingData, PongData,
    ResponseStatus, SynthesisOptions, SynthesisRequestData, SynthesisResponseData,
};

use super::config::ClientConfig;
use super::error::{ClientError, ClientResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of a full synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSpeech {
    /// Complete WAV file
    pub audio: Vec<u8>,
    pub message: String,
    pub metadata: Option<AudioMetadata>,
}

/// One streamed chunk, already base64-decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedChunk {
    pub index: u32,
    /// Little-endian int16 PCM, no header
    pub audio: Vec<u8>,
    pub metadata: ChunkMetadata,
}

impl StreamedChunk {
    pub fn samples(&self) -> Vec<i16> {
        pcm_from_le_bytes(&self.audio)
    }

    /// PCM layout reported by the gateway for this chunk.
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.metadata.sample_rate,
            channels: self.metadata.channels,
        }
    }
}

/// Totals for a finished stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub chunks: u32,
    pub total_bytes: usize,
    /// Seconds of audio received
    pub duration: f64,
    pub message: String,
}

/// Client for the TTS WebSocket protocol.
pub struct TtsClient {
    config: ClientConfig,
    socket: Option<WsStream>,
    /// Set by `connect`, cleared by `disconnect`
    active: bool,
}

impl TtsClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            socket: None,
            active: false,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Open the connection, retrying per the reconnection policy.
    pub async fn connect(&mut self) -> ClientResult<()> {
        self.active = true;
        if self.socket.is_some() {
            return Ok(());
        }
        self.establish().await
    }

    /// Close the connection gracefully.
    pub async fn disconnect(&mut self) {
        self.active = false;
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("Error while closing TTS connection: {}", e);
            }
            info!(url = %self.config.url, "Disconnected from TTS gateway");
        }
    }

    /// Synthesize `text` and return the complete WAV.
    pub async fn synthesize(
        &mut self,
        text: &str,
        options: &SynthesisOptions,
        reference_audio: Option<&[u8]>,
    ) -> ClientResult<SynthesizedSpeech> {
        let request = IncomingMessage::TtsRequest(request_data(text, options, reference_audio));
        let wait = self.config.request_timeout;

        match self.request(&request, wait, "tts_response").await? {
            OutgoingMessage::TtsResponse(data) => into_speech(data),
            other => Err(ClientError::UnexpectedMessage(
                other.message_type().to_string(),
            )),
        }
    }

    /// Synthesize `text` as a stream, calling `on_chunk` for each chunk in
    /// arrival order.
    pub async fn stream<F>(
        &mut self,
        text: &str,
        options: &SynthesisOptions,
        reference_audio: Option<&[u8]>,
        mut on_chunk: F,
    ) -> ClientResult<StreamOutcome>
    where
        F: FnMut(StreamedChunk),
    {
        let request =
            IncomingMessage::TtsStreamRequest(request_data(text, options, reference_audio));
        let wait = self.config.chunk_timeout;

        self.prepare().await?;
        let mut retried = false;
        if let Err(e) = self.send_message(&request).await {
            match e {
                ClientError::ConnectionLost(reason) => {
                    warn!("Connection lost before streaming ({}), reconnecting", reason);
                    retried = true;
                    self.establish().await?;
                    self.send_message(&request).await?;
                }
                other => return Err(other),
            }
        }

        let mut chunks: u32 = 0;
        let mut total_bytes = 0;
        let mut duration = 0.0;

        loop {
            match self.next_message(wait, "tts_stream_chunk").await {
                Ok(OutgoingMessage::TtsStreamChunk(data)) => {
                    let audio = BASE64_STANDARD.decode(&data.audio).map_err(|e| {
                        ClientError::Protocol(format!("Invalid chunk audio encoding: {e}"))
                    })?;
                    chunks += 1;
                    total_bytes += audio.len();
                    duration += data.metadata.duration;
                    on_chunk(StreamedChunk {
                        index: data.metadata.chunk_index,
                        audio,
                        metadata: data.metadata,
                    });
                }
                Ok(OutgoingMessage::TtsStreamComplete(data)) => {
                    debug!(chunks, total_bytes, "Stream complete");
                    return Ok(StreamOutcome {
                        chunks,
                        total_bytes,
                        duration,
                        message: data.message,
                    });
                }
                Ok(OutgoingMessage::TtsResponse(data)) if data.status == ResponseStatus::Error => {
                    return Err(ClientError::Server(data.message));
                }
                Ok(other) => {
                    return Err(ClientError::UnexpectedMessage(
                        other.message_type().to_string(),
                    ));
                }
                Err(ClientError::ConnectionLost(reason)) if chunks == 0 && !retried => {
                    warn!("Connection lost before any chunk ({}), retrying", reason);
                    retried = true;
                    self.establish().await?;
                    self.send_message(&request).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Liveness check.
    pub async fn ping(&mut self) -> ClientResult<PongData> {
        let wait = self.config.request_timeout;
        match self
            .request(&IncomingMessage::Ping(PingData {}), wait, "pong")
            .await?
        {
            OutgoingMessage::Pong(data) => Ok(data),
            other => Err(ClientError::UnexpectedMessage(
                other.message_type().to_string(),
            )),
        }
    }

    /// Send `message` and wait for its single reply, reconnecting once if the
    /// connection drops before the reply arrives.
    async fn request(
        &mut self,
        message: &IncomingMessage,
        wait: Duration,
        waiting_for: &str,
    ) -> ClientResult<OutgoingMessage> {
        self.prepare().await?;
        match self.exchange(message, wait, waiting_for).await {
            Err(ClientError::ConnectionLost(reason)) => {
                warn!("Connection lost before a reply ({}), reconnecting", reason);
                self.establish().await?;
                self.exchange(message, wait, waiting_for).await
            }
            other => other,
        }
    }

    async fn exchange(
        &mut self,
        message: &IncomingMessage,
        wait: Duration,
        waiting_for: &str,
    ) -> ClientResult<OutgoingMessage> {
        self.send_message(message).await?;
        self.next_message(wait, waiting_for).await
    }

    /// Make sure a live socket is available before sending.
    async fn prepare(&mut self) -> ClientResult<()> {
        if !self.active {
            return Err(ClientError::NotConnected);
        }
        self.drain_pending();
        if self.socket.is_none() {
            self.establish().await?;
        }
        Ok(())
    }

    /// Consume frames that arrived while idle. Notices a server-side close
    /// before the next request is written into a dead socket.
    fn drain_pending(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        let mut closed = false;
        while let Some(frame) = socket.next().now_or_never() {
            match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    closed = true;
                    break;
                }
                Some(Ok(message)) => {
                    debug!("Discarding idle frame ({} bytes)", message.len());
                }
            }
        }

        if closed {
            debug!("TTS connection closed while idle");
            self.socket = None;
        }
    }

    async fn establish(&mut self) -> ClientResult<()> {
        self.socket = None;
        let policy = self.config.reconnection.clone();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.open_socket().await {
                Ok(socket) => {
                    info!(url = %self.config.url, attempt, "Connected to TTS gateway");
                    self.socket = Some(socket);
                    return Ok(());
                }
                Err(reason) => {
                    if !policy.should_retry(attempt) {
                        return Err(ClientError::ConnectionFailed(format!(
                            "{reason} (gave up after {attempt} attempt(s))"
                        )));
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Connection attempt failed: {}",
                        reason
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn open_socket(&self) -> Result<WsStream, String> {
        let url = self.config.url.as_str();
        match timeout(self.config.connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, response))) => {
                debug!(status = %response.status(), "WebSocket handshake complete");
                Ok(stream)
            }
            Ok(Err(e)) => Err(format!("WebSocket connection to {url} failed: {e}")),
            Err(_) => Err(format!("Connection to {url} timed out")),
        }
    }

    async fn send_message(&mut self, message: &IncomingMessage) -> ClientResult<()> {
        let payload = serde_json::to_string(message)?;
        let socket = self.socket.as_mut().ok_or(ClientError::NotConnected)?;

        if let Err(e) = socket.send(Message::Text(payload.into())).await {
            self.socket = None;
            return Err(ClientError::ConnectionLost(format!("Send failed: {e}")));
        }
        Ok(())
    }

    /// Wait for the next protocol message. A timeout discards the socket so
    /// late replies cannot be mistaken for answers to a later request.
    async fn next_message(
        &mut self,
        wait: Duration,
        waiting_for: &str,
    ) -> ClientResult<OutgoingMessage> {
        loop {
            let socket = self.socket.as_mut().ok_or(ClientError::NotConnected)?;
            let frame = match timeout(wait, socket.next()).await {
                Ok(frame) => frame,
                Err(_) => {
                    self.socket = None;
                    return Err(ClientError::Timeout(waiting_for.to_string()));
                }
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).map_err(|e| {
                        ClientError::Protocol(format!("Invalid server message: {e}"))
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!("Ignoring unexpected binary frame ({} bytes)", data.len());
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.socket = None;
                    return Err(ClientError::ConnectionLost(
                        "Connection closed by server".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.socket = None;
                    return Err(ClientError::ConnectionLost(e.to_string()));
                }
            }
        }
    }
}

fn request_data(
    text: &str,
    options: &SynthesisOptions,
    reference_audio: Option<&[u8]>,
) -> SynthesisRequestData {
    SynthesisRequestData {
        text: text.to_string(),
        reference_audio: reference_audio.map(|audio| BASE64_STANDARD.encode(audio)),
        config: options.clone(),
    }
}

fn into_speech(data: SynthesisResponseData) -> ClientResult<SynthesizedSpeech> {
    if data.status != ResponseStatus::Success {
        return Err(ClientError::Server(data.message));
    }

    let audio = BASE64_STANDARD
        .decode(&data.audio)
        .map_err(|e| ClientError::Protocol(format!("Invalid audio encoding: {e}")))?;

    Ok(SynthesizedSpeech {
        audio,
        message: data.message,
        metadata: data.metadata,
    })
}
