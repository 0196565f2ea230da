use crate::core::tts::{AudioFormat, SynthesisConfig, get_supported_engines};
use crate::protocol::validate_synthesis_config;

use super::ServerConfig;

/// Smallest useful chunk payload: one 16-bit sample.
const MIN_CHUNK_SIZE: usize = 2;

/// Validate WebSocket timing and size limits
pub fn validate_websocket(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.ws_ping_interval_secs == 0 {
        return Err("WS_PING_INTERVAL_SECS must be greater than 0".into());
    }
    if config.ws_ping_timeout_secs == 0 {
        return Err("WS_PING_TIMEOUT_SECS must be greater than 0".into());
    }
    if config.ws_chunk_timeout_secs == 0 {
        return Err("WS_CHUNK_TIMEOUT_SECS must be greater than 0".into());
    }
    if config.ws_max_chunk_size < MIN_CHUNK_SIZE {
        return Err(format!(
            "WS_MAX_CHUNK_SIZE must be at least {MIN_CHUNK_SIZE} bytes, got {}",
            config.ws_max_chunk_size
        )
        .into());
    }
    if config.max_text_length == 0 {
        return Err("WS_MAX_TEXT_LENGTH must be greater than 0".into());
    }
    Ok(())
}

/// Validate engine selection
///
/// The HTTP engine needs a parseable http(s) URL. Every engine needs at
/// least one generation slot.
pub fn validate_engine(
    engine: &str,
    url: &Option<String>,
    max_concurrent_generations: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let supported = get_supported_engines();
    let engine = engine.trim().to_lowercase();
    let engine = match engine.as_str() {
        "builtin" => "tone",
        "remote" => "http",
        other => other,
    };
    if !supported.contains(&engine) {
        return Err(format!(
            "Unsupported TTS_ENGINE '{engine}'. Supported engines: {}",
            supported.join(", ")
        )
        .into());
    }

    if engine == "http" {
        let Some(url) = url else {
            return Err("TTS_ENGINE_URL is required when TTS_ENGINE is 'http'".into());
        };
        let parsed =
            url::Url::parse(url).map_err(|e| format!("Invalid TTS_ENGINE_URL '{url}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("TTS_ENGINE_URL must use http or https, got '{url}'").into());
        }
    }

    if max_concurrent_generations == 0 {
        return Err("TTS_MAX_CONCURRENT_GENERATIONS must be at least 1".into());
    }
    Ok(())
}

/// Validate default synthesis parameters with the same rules applied to requests
pub fn validate_synthesis_defaults(
    synthesis: &SynthesisConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    validate_synthesis_config(synthesis)
        .map_err(|e| format!("Invalid default synthesis configuration: {e}"))?;
    Ok(())
}

/// Validate output audio format
pub fn validate_audio(audio: &AudioFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !(8_000..=192_000).contains(&audio.sample_rate) {
        return Err(format!(
            "TTS_SAMPLE_RATE must be between 8000 and 192000 Hz, got {}",
            audio.sample_rate
        )
        .into());
    }
    if !(1..=2).contains(&audio.channels) {
        return Err(format!("audio.channels must be 1 or 2, got {}", audio.channels).into());
    }
    Ok(())
}

/// Validate rate limiting; a rate of 0 turns it off
pub fn validate_rate_limit(
    requests_per_second: u32,
    burst_size: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if requests_per_second > 0 && burst_size == 0 {
        return Err(
            "RATE_LIMIT_BURST_SIZE must be greater than 0 when rate limiting is enabled".into(),
        );
    }
    Ok(())
}

/// Validate connection limits
pub fn validate_connection_limits(
    max_websocket_connections: Option<usize>,
    max_connections_per_ip: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_websocket_connections == Some(0) {
        return Err("MAX_WEBSOCKET_CONNECTIONS must be greater than 0 when set".into());
    }
    if max_connections_per_ip == 0 {
        return Err("MAX_CONNECTIONS_PER_IP must be greater than 0".into());
    }
    Ok(())
}
