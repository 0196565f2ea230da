//! TTS WebSocket message types
//!
//! Every frame on the wire is a JSON text message of the form
//! `{"type": "...", "data": {...}}`. Client requests are parsed in two steps
//! (envelope first, then payload) so malformed JSON and unknown message types
//! produce distinct error replies instead of a generic decode failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::validation::{Emotion, Language};

pub const TTS_REQUEST: &str = "tts_request";
pub const TTS_STREAM_REQUEST: &str = "tts_stream_request";
pub const PING: &str = "ping";

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Errors raised while decoding a client frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid request data: {0}")]
    InvalidData(String),
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum IncomingMessage {
    /// Generate the full utterance and answer with a single WAV payload
    TtsRequest(SynthesisRequestData),
    /// Generate incrementally and answer with PCM chunks plus a completion marker
    TtsStreamRequest(SynthesisRequestData),
    /// Liveness check
    Ping(PingData),
}

impl IncomingMessage {
    /// Decode a client text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;

        // Non-string tags are reported by their JSON text.
        let message_type = match value.get("type") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let data = value.get("data").cloned().unwrap_or(Value::Null);

        match message_type.as_str() {
            TTS_REQUEST => Ok(Self::TtsRequest(SynthesisRequestData::from_value(data)?)),
            TTS_STREAM_REQUEST => Ok(Self::TtsStreamRequest(SynthesisRequestData::from_value(
                data,
            )?)),
            PING => Ok(Self::Ping(PingData {})),
            _ => Err(ProtocolError::UnknownType(message_type)),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Self::TtsRequest(_) => TTS_REQUEST,
            Self::TtsStreamRequest(_) => TTS_STREAM_REQUEST,
            Self::Ping(_) => PING,
        }
    }
}

/// Payload of `tts_request` and `tts_stream_request`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequestData {
    /// Text to synthesize
    #[serde(default)]
    pub text: String,

    /// Base64 encoded reference audio for voice cloning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio: Option<String>,

    /// Per-request overrides of the server defaults
    #[serde(default)]
    pub config: SynthesisOptions,
}

impl SynthesisRequestData {
    fn from_value(data: Value) -> Result<Self, ProtocolError> {
        if data.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(data).map_err(|e| ProtocolError::InvalidData(e.to_string()))
    }
}

/// Synthesis overrides as they appear on the wire.
///
/// Language and emotion stay strings here so unsupported values reach
/// validation and get a descriptive error instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_frames: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl SynthesisOptions {
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language.as_str().to_string());
        self
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion.as_str().to_string());
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Fields set on `self` win, unset fields fall back to `base`.
    pub fn merged_over(&self, base: &SynthesisOptions) -> SynthesisOptions {
        SynthesisOptions {
            language: self.language.clone().or_else(|| base.language.clone()),
            emotion: self.emotion.clone().or_else(|| base.emotion.clone()),
            speed: self.speed.or(base.speed),
            temperature: self.temperature.or(base.temperature),
            max_tokens: self.max_tokens.or(base.max_tokens),
            top_p: self.top_p.or(base.top_p),
            chunk_size: self.chunk_size.or(base.chunk_size),
            lookback_frames: self.lookback_frames.or(base.lookback_frames),
            voice_id: self.voice_id.clone().or_else(|| base.voice_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingData {}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Messages the gateway sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// Full synthesis result, also used for every error reply
    TtsResponse(SynthesisResponseData),
    /// One slice of raw PCM during streaming
    TtsStreamChunk(StreamChunkData),
    /// Terminates a successful stream
    TtsStreamComplete(StreamCompleteData),
    Pong(PongData),
}

impl OutgoingMessage {
    /// Error reply. Errors always travel as a `tts_response` with empty audio.
    pub fn error(message: impl Into<String>) -> Self {
        Self::TtsResponse(SynthesisResponseData {
            audio: String::new(),
            status: ResponseStatus::Error,
            message: message.into(),
            metadata: None,
        })
    }

    pub fn success(audio: String, metadata: AudioMetadata) -> Self {
        Self::TtsResponse(SynthesisResponseData {
            audio,
            status: ResponseStatus::Success,
            message: "Audio generated successfully".to_string(),
            metadata: Some(metadata),
        })
    }

    pub fn chunk(audio: String, metadata: ChunkMetadata) -> Self {
        Self::TtsStreamChunk(StreamChunkData {
            audio,
            status: ResponseStatus::Streaming,
            metadata,
        })
    }

    pub fn complete(chunks: u32, duration: f64) -> Self {
        Self::TtsStreamComplete(StreamCompleteData {
            status: ResponseStatus::Completed,
            message: "Audio streaming completed".to_string(),
            metadata: Some(StreamSummary { chunks, duration }),
        })
    }

    pub fn pong(tts_initialized: bool) -> Self {
        Self::Pong(PongData {
            status: ResponseStatus::Alive,
            tts_initialized,
        })
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Self::TtsResponse(_) => "tts_response",
            Self::TtsStreamChunk(_) => "tts_stream_chunk",
            Self::TtsStreamComplete(_) => "tts_stream_complete",
            Self::Pong(_) => "pong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    Streaming,
    Completed,
    Alive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResponseData {
    /// Base64 encoded WAV, empty on error
    #[serde(default)]
    pub audio: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AudioMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    /// Seconds of audio
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub language: Language,
    pub emotion: Emotion,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunkData {
    /// Base64 encoded little-endian int16 PCM, no header
    pub audio: String,
    pub status: ResponseStatus,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub chunk_index: u32,
    /// Decoded payload length in bytes
    pub chunk_size: usize,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCompleteData {
    pub status: ResponseStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StreamSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub chunks: u32,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongData {
    pub status: ResponseStatus,
    #[serde(default)]
    pub tts_initialized: bool,
}
