//! Client adapter for the TTS gateway.
//!
//! [`TtsClient`] speaks the WebSocket protocol directly;
//! [`AssistantVoice`] layers lazy initialization and assistant defaults on
//! top of it.

pub mod assistant;
pub mod config;
pub mod error;
pub mod tts_client;

pub use assistant::{AssistantVoice, assistant_defaults};
pub use config::{ClientConfig, ReconnectionConfig};
pub use error::{ClientError, ClientResult};
pub use tts_client::{StreamOutcome, StreamedChunk, SynthesizedSpeech, TtsClient};
