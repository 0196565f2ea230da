mod base;
pub mod http;
pub mod tone;
pub mod wav;
pub mod window;

use std::sync::Arc;

pub use base::{
    AudioChunk, AudioChunkStream, AudioFormat, BYTES_PER_SAMPLE, DEFAULT_CHANNELS,
    DEFAULT_SAMPLE_RATE, EngineOptions, FRAME_RATE_HZ, SynthesisConfig, SynthesizedAudio,
    Synthesizer, TOKENS_PER_FRAME, TTSError, TTSResult,
};
pub use http::HttpSynthesizer;
pub use tone::ToneSynthesizer;
pub use window::{FrameDecoder, FrameWindow};

/// Factory function to create a synthesis engine.
///
/// # Supported Engines
///
/// - `"tone"` or `"builtin"` - deterministic built-in tone renderer
/// - `"http"` or `"remote"` - model server reached over HTTP (requires `url`)
///
/// # Example
///
/// ```rust,ignore
/// use kani_tts_gateway::core::tts::{create_synthesizer, EngineOptions};
///
/// let options = EngineOptions {
///     url: Some("http://localhost:9000".to_string()),
///     ..Default::default()
/// };
///
/// let engine = create_synthesizer("http", options)?;
/// ```
pub fn create_synthesizer(
    engine_type: &str,
    options: EngineOptions,
) -> TTSResult<Arc<dyn Synthesizer>> {
    match engine_type.trim().to_lowercase().as_str() {
        "tone" | "builtin" => Ok(Arc::new(ToneSynthesizer::new(options.format))),
        "http" | "remote" => Ok(Arc::new(HttpSynthesizer::new(options)?)),
        _ => Err(TTSError::InvalidConfiguration(format!(
            "Unsupported TTS engine: {engine_type}. Supported engines: {}",
            get_supported_engines().join(", ")
        ))),
    }
}

pub fn get_supported_engines() -> Vec<&'static str> {
    vec!["tone", "http"]
}
