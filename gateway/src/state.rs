//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::core::tts::{Synthesizer, TTSError, TTSResult, create_synthesizer};

/// Reasons a WebSocket connection is refused before upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP WebSocket connection limit reached")]
    PerIpLimitReached,
}

/// Live WebSocket connection counts, globally and per client IP.
#[derive(Debug)]
pub struct ConnectionTracker {
    max_total: Option<usize>,
    max_per_ip: u32,
    total: AtomicUsize,
    per_ip: DashMap<IpAddr, u32>,
}

impl ConnectionTracker {
    pub fn new(max_total: Option<usize>, max_per_ip: u32) -> Self {
        Self {
            max_total,
            max_per_ip,
            total: AtomicUsize::new(0),
            per_ip: DashMap::new(),
        }
    }

    /// Reserve a slot for `ip`. The slot is returned when the guard drops.
    pub fn try_acquire(
        self: &Arc<Self>,
        ip: IpAddr,
    ) -> Result<ConnectionSlot, ConnectionLimitError> {
        let reserved = self
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match self.max_total {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            });
        if reserved.is_err() {
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        {
            let mut count = self.per_ip.entry(ip).or_insert(0);
            if *count >= self.max_per_ip {
                drop(count);
                self.total.fetch_sub(1, Ordering::SeqCst);
                return Err(ConnectionLimitError::PerIpLimitReached);
            }
            *count += 1;
        }

        Ok(ConnectionSlot {
            tracker: Arc::clone(self),
            ip,
        })
    }

    fn release(&self, ip: IpAddr) {
        if let Some(mut count) = self.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.per_ip.remove_if(&ip, |_, count| *count == 0);
        let _ = self
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn for_ip(&self, ip: &IpAddr) -> u32 {
        self.per_ip.get(ip).map(|c| *c).unwrap_or(0)
    }
}

/// A reserved connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    tracker: Arc<ConnectionTracker>,
    ip: IpAddr,
}

impl ConnectionSlot {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.tracker.release(self.ip);
        debug!(ip = %self.ip, "Released WebSocket connection slot");
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub synthesizer: Arc<dyn Synthesizer>,
    generation_permits: Arc<Semaphore>,
    connections: Arc<ConnectionTracker>,
}

impl AppState {
    /// Build state with the engine named in the configuration.
    pub fn new(config: ServerConfig) -> TTSResult<Arc<Self>> {
        let synthesizer = create_synthesizer(&config.tts_engine, config.engine_options())?;
        info!(
            engine = synthesizer.name(),
            sample_rate = config.audio.sample_rate,
            "Synthesis engine initialized"
        );
        Ok(Self::with_synthesizer(config, synthesizer))
    }

    /// Build state around an existing engine.
    pub fn with_synthesizer(config: ServerConfig, synthesizer: Arc<dyn Synthesizer>) -> Arc<Self> {
        let generation_permits = Arc::new(Semaphore::new(config.max_concurrent_generations.max(1)));
        let connections = Arc::new(ConnectionTracker::new(
            config.max_websocket_connections,
            config.max_connections_per_ip,
        ));

        Arc::new(Self {
            config,
            synthesizer,
            generation_permits,
            connections,
        })
    }

    /// Wait for a generation slot. Hold the permit for the whole generation.
    pub async fn acquire_generation(&self) -> TTSResult<OwnedSemaphorePermit> {
        Arc::clone(&self.generation_permits)
            .acquire_owned()
            .await
            .map_err(|_| TTSError::EngineUnavailable("generation queue closed".to_string()))
    }

    pub fn available_generations(&self) -> usize {
        self.generation_permits.available_permits()
    }

    /// Whether the engine is loaded and ready, as reported in pong replies.
    pub fn tts_initialized(&self) -> bool {
        self.synthesizer.is_ready()
    }

    pub fn try_acquire_connection(
        &self,
        ip: IpAddr,
    ) -> Result<ConnectionSlot, ConnectionLimitError> {
        self.connections.try_acquire(ip)
    }

    pub fn ws_connection_count(&self) -> usize {
        self.connections.total()
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.connections.for_ip(ip)
    }
}
