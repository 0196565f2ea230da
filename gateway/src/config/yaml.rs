use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8001
///   tls:
///     cert_path: "/etc/kani/cert.pem"
///     key_path: "/etc/kani/key.pem"
///
/// websocket:
///   ping_interval_secs: 20
///   ping_timeout_secs: 10
///   chunk_timeout_secs: 30
///   max_chunk_size: 1048576
///   max_text_length: 50000
///
/// engine:
///   kind: "http"
///   url: "http://localhost:9000"
///   api_key: "engine-secret"
///   request_timeout_secs: 120
///   max_concurrent_generations: 1
///
/// synthesis:
///   language: "spanish"
///   emotion: "neutral"
///   speed: 1.0
///   temperature: 0.6
///   top_p: 0.95
///   max_tokens: 1200
///   chunk_size: 25
///   lookback_frames: 15
///   voice_id: "default"
///
/// audio:
///   sample_rate: 22050
///   channels: 1
///
/// security:
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub websocket: Option<WebSocketYaml>,
    pub engine: Option<EngineYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub audio: Option<AudioYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// WebSocket protocol timing and limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebSocketYaml {
    pub ping_interval_secs: Option<u64>,
    pub ping_timeout_secs: Option<u64>,
    pub chunk_timeout_secs: Option<u64>,
    pub max_chunk_size: Option<usize>,
    pub max_text_length: Option<usize>,
}

/// Synthesis engine selection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineYaml {
    /// "tone" or "http"
    pub kind: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_concurrent_generations: Option<usize>,
}

/// Default synthesis parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub language: Option<String>,
    pub emotion: Option<String>,
    pub speed: Option<f32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub chunk_size: Option<u32>,
    pub lookback_frames: Option<u32>,
    pub voice_id: Option<String>,
}

/// Output audio format from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Maximum requests per second per IP
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Result<Self, Box<dyn std::error::Error>>` - The parsed configuration or an error
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
