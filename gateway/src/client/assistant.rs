//! Voice output for a Spanish-speaking chat assistant.

use tracing::{info, warn};

use crate::protocol::{Emotion, Language, SynthesisOptions};

use super::config::ClientConfig;
use super::error::ClientResult;
use super::tts_client::{StreamOutcome, StreamedChunk, SynthesizedSpeech, TtsClient};

/// Options the assistant sends unless the caller overrides them.
pub fn assistant_defaults() -> SynthesisOptions {
    SynthesisOptions {
        language: Some(Language::Spanish.as_str().to_string()),
        emotion: Some(Emotion::Friendly.as_str().to_string()),
        speed: Some(1.0),
        temperature: Some(0.6),
        max_tokens: Some(1200),
        top_p: Some(0.95),
        chunk_size: Some(25),
        lookback_frames: Some(15),
        voice_id: Some("default".to_string()),
    }
}

/// Lazily connected TTS client with assistant defaults.
pub struct AssistantVoice {
    client: TtsClient,
    defaults: SynthesisOptions,
    initialized: bool,
}

impl AssistantVoice {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: TtsClient::new(config),
            defaults: assistant_defaults(),
            initialized: false,
        }
    }

    /// Replace the default options entirely.
    pub fn with_defaults(mut self, defaults: SynthesisOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &SynthesisOptions {
        &self.defaults
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Connect and confirm the gateway answers a ping. Idempotent.
    pub async fn initialize(&mut self) -> ClientResult<()> {
        if self.initialized {
            return Ok(());
        }

        self.client.connect().await?;
        let pong = self.client.ping().await?;
        if !pong.tts_initialized {
            warn!("TTS gateway is reachable but reports the engine as not initialized");
        }

        info!(url = %self.client.config().url, "Assistant voice ready");
        self.initialized = true;
        Ok(())
    }

    /// Full synthesis with `overrides` merged over the defaults.
    pub async fn generate_speech(
        &mut self,
        text: &str,
        overrides: &SynthesisOptions,
    ) -> ClientResult<SynthesizedSpeech> {
        self.initialize().await?;
        let options = overrides.merged_over(&self.defaults);
        self.client.synthesize(text, &options, None).await
    }

    /// Streaming synthesis with `overrides` merged over the defaults.
    pub async fn stream_speech<F>(
        &mut self,
        text: &str,
        overrides: &SynthesisOptions,
        on_chunk: F,
    ) -> ClientResult<StreamOutcome>
    where
        F: FnMut(StreamedChunk),
    {
        self.initialize().await?;
        let options = overrides.merged_over(&self.defaults);
        self.client.stream(text, &options, None, on_chunk).await
    }

    pub async fn disconnect(&mut self) {
        self.client.disconnect().await;
        self.initialized = false;
    }
}
