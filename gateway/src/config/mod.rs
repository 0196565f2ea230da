//! Configuration module for the Kani TTS gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use kani_tts_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::core::tts::{AudioFormat, EngineOptions, SynthesisConfig};

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 20;
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHUNK_TIMEOUT_SECS: u64 = 30;
/// 1 MiB
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 50_000;
pub const DEFAULT_ENGINE: &str = "tone";
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_CONCURRENT_GENERATIONS: usize = 1;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway, including:
/// - Server settings (host, port, TLS)
/// - WebSocket keepalive and streaming limits
/// - Synthesis engine selection and concurrency
/// - Default synthesis parameters and output format
/// - Security settings (rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // WebSocket settings
    /// Seconds between server keepalive pings
    pub ws_ping_interval_secs: u64,
    /// Seconds to wait for a pong before dropping the connection
    pub ws_ping_timeout_secs: u64,
    /// Longest wait for the next streamed chunk
    pub ws_chunk_timeout_secs: u64,
    /// Largest decoded chunk payload in bytes
    pub ws_max_chunk_size: usize,
    /// Longest accepted request text in bytes
    pub max_text_length: usize,

    // Engine settings
    /// Engine name, see `core::tts::get_supported_engines`
    pub tts_engine: String,
    pub tts_engine_url: Option<String>,
    pub tts_engine_api_key: Option<String>,
    pub tts_engine_timeout_secs: u64,
    /// Generations allowed to run at once across all connections
    pub max_concurrent_generations: usize,

    /// Defaults applied to fields a request leaves out
    pub synthesis: SynthesisConfig,
    pub audio: AudioFormat,

    // Rate limiting configuration
    /// Maximum requests per second per IP address, 0 disables
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            ws_ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            ws_ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            ws_chunk_timeout_secs: DEFAULT_CHUNK_TIMEOUT_SECS,
            ws_max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            tts_engine: DEFAULT_ENGINE.to_string(),
            tts_engine_url: None,
            tts_engine_api_key: None,
            tts_engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
            max_concurrent_generations: DEFAULT_MAX_CONCURRENT_GENERATIONS,
            synthesis: SynthesisConfig::default(),
            audio: AudioFormat::default(),
            rate_limit_requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: DEFAULT_RATE_LIMIT_BURST,
            max_websocket_connections: None,
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
        }
    }
}

/// Implement Drop to zeroize secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.tts_engine_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to defaults. The .env file is loaded in
    /// main.rs before this runs, so its values appear as environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Run every validation check against the merged configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_websocket(self)?;
        if self.tts_engine_timeout_secs == 0 {
            return Err("TTS_ENGINE_TIMEOUT_SECS must be greater than 0".into());
        }
        validation::validate_engine(
            &self.tts_engine,
            &self.tts_engine_url,
            self.max_concurrent_generations,
        )?;
        validation::validate_synthesis_defaults(&self.synthesis)?;
        validation::validate_audio(&self.audio)?;
        validation::validate_rate_limit(
            self.rate_limit_requests_per_second,
            self.rate_limit_burst_size,
        )?;
        validation::validate_connection_limits(
            self.max_websocket_connections,
            self.max_connections_per_ip,
        )?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_ping_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_chunk_timeout_secs)
    }

    /// Upper bound on a full (non-streaming) generation.
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_engine_timeout_secs)
    }

    /// Options handed to the engine factory.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            url: self.tts_engine_url.clone(),
            api_key: self.tts_engine_api_key.clone().map(Zeroizing::new),
            request_timeout: self.generation_timeout(),
            format: self.audio,
        }
    }
}
