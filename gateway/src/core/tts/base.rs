//! Synthesis seam between the gateway and the speech model.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::protocol::{Emotion, Language};

/// Codec frames per second produced by the model.
pub const FRAME_RATE_HZ: f64 = 12.5;

/// Model tokens consumed per codec frame.
pub const TOKENS_PER_FRAME: u32 = 4;

pub const DEFAULT_SAMPLE_RATE: u32 = 22050;
pub const DEFAULT_CHANNELS: u16 = 1;

/// Bytes per sample for 16-bit PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Errors raised by synthesis engines
#[derive(Debug, Error)]
pub enum TTSError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Audio encoding error: {0}")]
    AudioEncoding(String),
    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type TTSResult<T> = Result<T, TTSError>;

/// Parameters for one synthesis call, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub language: Language,
    pub emotion: Emotion,
    /// Playback speed multiplier
    pub speed: f32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Frames per streamed window
    pub chunk_size: u32,
    /// Frames of left context re-decoded with each window
    pub lookback_frames: u32,
    pub voice_id: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            language: Language::Spanish,
            emotion: Emotion::Neutral,
            speed: 1.0,
            temperature: 0.6,
            top_p: 0.95,
            max_tokens: 1200,
            chunk_size: 25,
            lookback_frames: 15,
            voice_id: "default".to_string(),
        }
    }
}

impl SynthesisConfig {
    /// Largest number of codec frames the token budget allows.
    pub fn max_frames(&self) -> usize {
        (self.max_tokens / TOKENS_PER_FRAME).max(1) as usize
    }
}

/// PCM layout of engine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl AudioFormat {
    /// Samples (per channel) covered by one codec frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as f64 / FRAME_RATE_HZ).round() as usize
    }

    /// Duration in seconds of `samples` interleaved samples.
    pub fn duration_of(&self, samples: usize) -> f64 {
        samples as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }

    pub fn bytes_per_frame(&self) -> usize {
        BYTES_PER_SAMPLE * self.channels.max(1) as usize
    }
}

/// Complete utterance returned by [`Synthesizer::synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

impl SynthesizedAudio {
    pub fn duration(&self) -> f64 {
        self.format.duration_of(self.samples.len())
    }
}

/// One window of streamed PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

impl AudioChunk {
    pub fn duration(&self) -> f64 {
        self.format.duration_of(self.samples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub type AudioChunkStream = Pin<Box<dyn Stream<Item = TTSResult<AudioChunk>> + Send>>;

/// Engine construction parameters, resolved from server configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Base URL of a remote engine
    pub url: Option<String>,
    /// Bearer token for the remote engine
    pub api_key: Option<Zeroizing<String>>,
    pub request_timeout: Duration,
    pub format: AudioFormat,
}

/// A text-to-speech engine.
///
/// Implementations must be shareable across connections. Streams are
/// `'static` so the caller can poll them with per-chunk timeouts.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short engine identifier for logs and health output.
    fn name(&self) -> &'static str;

    fn audio_format(&self) -> AudioFormat;

    /// Whether the engine can currently accept work.
    fn is_ready(&self) -> bool {
        true
    }

    /// Generate the whole utterance.
    async fn synthesize(
        &self,
        text: &str,
        config: &SynthesisConfig,
        reference_audio: Option<&[u8]>,
    ) -> TTSResult<SynthesizedAudio>;

    /// Generate the utterance as a lazy stream of PCM windows in playback order.
    async fn synthesize_stream(
        &self,
        text: &str,
        config: &SynthesisConfig,
        reference_audio: Option<&[u8]>,
    ) -> TTSResult<AudioChunkStream>;
}
