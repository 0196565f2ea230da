use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};

/// Every environment variable the gateway reads.
pub(crate) const ALL_ENV_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "TLS_CERT_PATH",
    "TLS_KEY_PATH",
    "WS_PING_INTERVAL_SECS",
    "WS_PING_TIMEOUT_SECS",
    "WS_CHUNK_TIMEOUT_SECS",
    "WS_MAX_CHUNK_SIZE",
    "WS_MAX_TEXT_LENGTH",
    "TTS_ENGINE",
    "TTS_ENGINE_URL",
    "TTS_ENGINE_API_KEY",
    "TTS_ENGINE_TIMEOUT_SECS",
    "TTS_MAX_CONCURRENT_GENERATIONS",
    "TTS_DEFAULT_LANGUAGE",
    "TTS_DEFAULT_EMOTION",
    "TTS_DEFAULT_SPEED",
    "TTS_TEMPERATURE",
    "TTS_MAX_TOKENS",
    "TTS_TOP_P",
    "TTS_CHUNK_SIZE",
    "TTS_LOOKBACK_FRAMES",
    "TTS_VOICE_ID",
    "TTS_SAMPLE_RATE",
    "RATE_LIMIT_REQUESTS_PER_SECOND",
    "RATE_LIMIT_BURST_SIZE",
    "MAX_WEBSOCKET_CONNECTIONS",
    "MAX_CONNECTIONS_PER_IP",
];

/// Read a non-empty string variable.
fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable, reporting the variable name on failure.
fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}")),
        None => Ok(None),
    }
}

/// Build a configuration from defaults overridden by environment variables.
pub fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }

    config.tls = match (env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };

    if let Some(secs) = env_parse("WS_PING_INTERVAL_SECS")? {
        config.ws_ping_interval_secs = secs;
    }
    if let Some(secs) = env_parse("WS_PING_TIMEOUT_SECS")? {
        config.ws_ping_timeout_secs = secs;
    }
    if let Some(secs) = env_parse("WS_CHUNK_TIMEOUT_SECS")? {
        config.ws_chunk_timeout_secs = secs;
    }
    if let Some(size) = env_parse("WS_MAX_CHUNK_SIZE")? {
        config.ws_max_chunk_size = size;
    }
    if let Some(length) = env_parse("WS_MAX_TEXT_LENGTH")? {
        config.max_text_length = length;
    }

    if let Some(engine) = env_string("TTS_ENGINE") {
        config.tts_engine = engine.to_lowercase();
    }
    config.tts_engine_url = env_string("TTS_ENGINE_URL");
    config.tts_engine_api_key = env_string("TTS_ENGINE_API_KEY");
    if let Some(secs) = env_parse("TTS_ENGINE_TIMEOUT_SECS")? {
        config.tts_engine_timeout_secs = secs;
    }
    if let Some(max) = env_parse("TTS_MAX_CONCURRENT_GENERATIONS")? {
        config.max_concurrent_generations = max;
    }

    let synthesis = &mut config.synthesis;
    if let Some(language) = env_string("TTS_DEFAULT_LANGUAGE") {
        synthesis.language = language
            .parse()
            .map_err(|e| format!("Invalid value for TTS_DEFAULT_LANGUAGE: {e}"))?;
    }
    if let Some(emotion) = env_string("TTS_DEFAULT_EMOTION") {
        synthesis.emotion = emotion
            .parse()
            .map_err(|e| format!("Invalid value for TTS_DEFAULT_EMOTION: {e}"))?;
    }
    if let Some(speed) = env_parse("TTS_DEFAULT_SPEED")? {
        synthesis.speed = speed;
    }
    if let Some(temperature) = env_parse("TTS_TEMPERATURE")? {
        synthesis.temperature = temperature;
    }
    if let Some(max_tokens) = env_parse("TTS_MAX_TOKENS")? {
        synthesis.max_tokens = max_tokens;
    }
    if let Some(top_p) = env_parse("TTS_TOP_P")? {
        synthesis.top_p = top_p;
    }
    if let Some(chunk_size) = env_parse("TTS_CHUNK_SIZE")? {
        synthesis.chunk_size = chunk_size;
    }
    if let Some(lookback) = env_parse("TTS_LOOKBACK_FRAMES")? {
        synthesis.lookback_frames = lookback;
    }
    if let Some(voice_id) = env_string("TTS_VOICE_ID") {
        synthesis.voice_id = voice_id;
    }

    if let Some(sample_rate) = env_parse("TTS_SAMPLE_RATE")? {
        config.audio.sample_rate = sample_rate;
    }

    if let Some(rps) = env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = env_parse("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = env_parse("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(per_ip) = env_parse("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = per_ip;
    }

    Ok(config)
}
