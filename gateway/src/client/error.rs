use thiserror::Error;

/// Errors surfaced by the client adapter
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected")]
    NotConnected,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    /// The gateway answered with `status: "error"`
    #[error("Server error: {0}")]
    Server(String),
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
