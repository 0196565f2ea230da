use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Merge YAML overrides on top of the environment-derived configuration.
///
/// Values present in YAML win. Anything YAML leaves out keeps the value
/// resolved from environment variables or defaults.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            if tls.enabled == Some(false) {
                config.tls = None;
            } else {
                match (tls.cert_path, tls.key_path) {
                    (Some(cert), Some(key)) => {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    }
                    (None, None) => {}
                    _ => {
                        return Err("server.tls requires both cert_path and key_path".into());
                    }
                }
            }
        }
    }

    if let Some(websocket) = yaml.websocket {
        if let Some(secs) = websocket.ping_interval_secs {
            config.ws_ping_interval_secs = secs;
        }
        if let Some(secs) = websocket.ping_timeout_secs {
            config.ws_ping_timeout_secs = secs;
        }
        if let Some(secs) = websocket.chunk_timeout_secs {
            config.ws_chunk_timeout_secs = secs;
        }
        if let Some(size) = websocket.max_chunk_size {
            config.ws_max_chunk_size = size;
        }
        if let Some(length) = websocket.max_text_length {
            config.max_text_length = length;
        }
    }

    if let Some(engine) = yaml.engine {
        if let Some(kind) = engine.kind {
            config.tts_engine = kind.trim().to_lowercase();
        }
        if engine.url.is_some() {
            config.tts_engine_url = engine.url;
        }
        if engine.api_key.is_some() {
            config.tts_engine_api_key = engine.api_key;
        }
        if let Some(secs) = engine.request_timeout_secs {
            config.tts_engine_timeout_secs = secs;
        }
        if let Some(max) = engine.max_concurrent_generations {
            config.max_concurrent_generations = max;
        }
    }

    if let Some(synthesis) = yaml.synthesis {
        let defaults = &mut config.synthesis;
        if let Some(language) = synthesis.language {
            defaults.language = language
                .parse()
                .map_err(|e| format!("Invalid synthesis.language: {e}"))?;
        }
        if let Some(emotion) = synthesis.emotion {
            defaults.emotion = emotion
                .parse()
                .map_err(|e| format!("Invalid synthesis.emotion: {e}"))?;
        }
        if let Some(speed) = synthesis.speed {
            defaults.speed = speed;
        }
        if let Some(temperature) = synthesis.temperature {
            defaults.temperature = temperature;
        }
        if let Some(top_p) = synthesis.top_p {
            defaults.top_p = top_p;
        }
        if let Some(max_tokens) = synthesis.max_tokens {
            defaults.max_tokens = max_tokens;
        }
        if let Some(chunk_size) = synthesis.chunk_size {
            defaults.chunk_size = chunk_size;
        }
        if let Some(lookback) = synthesis.lookback_frames {
            defaults.lookback_frames = lookback;
        }
        if let Some(voice_id) = synthesis.voice_id {
            defaults.voice_id = voice_id;
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(sample_rate) = audio.sample_rate {
            config.audio.sample_rate = sample_rate;
        }
        if let Some(channels) = audio.channels {
            config.audio.channels = channels;
        }
    }

    if let Some(security) = yaml.security {
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AudioYaml, EngineYaml, SecurityYaml, ServerYaml, TlsYaml};
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            for name in env::ALL_ENV_VARS {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_merge_without_yaml_is_env() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("PORT", "7000");
        }

        let config = merge_config(None).unwrap();
        assert_eq!(config.port, 7000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_yaml_sections() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("MAX_CONNECTIONS_PER_IP", "3");
        }

        let yaml = YamlConfig {
            audio: Some(AudioYaml {
                sample_rate: Some(24000),
                channels: None,
            }),
            security: Some(SecurityYaml {
                max_websocket_connections: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.audio.sample_rate, 24000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.max_websocket_connections, Some(10));
        assert_eq!(config.max_connections_per_ip, 3);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_tls_disabled_in_yaml() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
            std::env::set_var("TLS_KEY_PATH", "/tmp/key.pem");
        }

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                tls: Some(TlsYaml {
                    enabled: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert!(!config.is_tls_enabled());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_tls_partial_rejected() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                tls: Some(TlsYaml {
                    cert_path: Some("/tmp/cert.pem".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(merge_config(Some(yaml)).is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_engine_section() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            engine: Some(EngineYaml {
                kind: Some("HTTP".to_string()),
                url: Some("http://model:9000".to_string()),
                request_timeout_secs: Some(45),
                max_concurrent_generations: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.tts_engine, "http");
        assert_eq!(config.tts_engine_timeout_secs, 45);
        assert_eq!(config.generation_timeout(), std::time::Duration::from_secs(45));
        assert_eq!(config.max_concurrent_generations, 2);

        cleanup_env_vars();
    }
}
