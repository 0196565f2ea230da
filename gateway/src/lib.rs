pub mod client;
pub mod config;
pub mod core;
pub mod handlers;
pub mod middleware;
pub mod protocol;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use client::{AssistantVoice, ClientConfig, ClientError, TtsClient};
pub use config::ServerConfig;
pub use core::*;
pub use state::AppState;
