//! Client adapter configuration.

use std::time::{Duration, SystemTime};

pub const DEFAULT_URL: &str = "ws://localhost:8001";

/// Backoff policy for re-establishing a lost connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionConfig {
    /// Reconnect at all. Default: true
    pub enabled: bool,

    /// Connection attempts before giving up, counting the first.
    /// 0 means unlimited. Default: 3
    pub max_attempts: u32,

    /// Delay after the first failed attempt. Default: 500ms
    pub initial_delay: Duration,

    /// Upper bound on any single delay. Default: 5s
    pub max_delay: Duration,

    /// Default: 2.0
    pub backoff_multiplier: f64,

    /// Spread delays by up to ±25%. Default: true
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    /// A single connection attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter {
            capped + jitter_offset(capped * 0.25)
        } else {
            capped
        };
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Whether another attempt may follow failed attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt < self.max_attempts)
    }
}

/// Pseudo-random offset in `[-range, range]` from a clock-seeded LCG.
fn jitter_offset(range: f64) -> f64 {
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = (seed.wrapping_mul(1103515245).wrapping_add(12345) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0 * range
}

/// Settings for [`TtsClient`](super::TtsClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Gateway WebSocket URL
    pub url: String,
    /// Bound on establishing one connection
    pub connect_timeout: Duration,
    /// Bound on waiting for a full `tts_response` or `pong`
    pub request_timeout: Duration,
    /// Bound on waiting for each streamed message
    pub chunk_timeout: Duration,
    pub reconnection: ReconnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            chunk_timeout: Duration::from_secs(30),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://localhost:8001");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.chunk_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnection.max_attempts, 3);
    }

    #[test]
    fn test_backoff_without_jitter() {
        let config = ReconnectionConfig {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.delay_for(2), Duration::from_millis(1000));
        assert_eq!(config.delay_for(3), Duration::from_millis(2000));
        // Capped
        assert_eq!(config.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = ReconnectionConfig::default();
        for attempt in 1..5 {
            let delay = config.delay_for(attempt).as_secs_f64();
            let base = (0.5 * 2f64.powi(attempt as i32 - 1)).min(5.0);
            assert!(delay >= base * 0.75 - 1e-6, "attempt {attempt}: {delay}");
            assert!(delay <= base * 1.25 + 1e-6, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn test_should_retry() {
        let config = ReconnectionConfig::default();
        assert!(config.should_retry(1));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));

        assert!(!ReconnectionConfig::disabled().should_retry(1));

        let unlimited = ReconnectionConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(unlimited.should_retry(1000));
    }
}
