//! Gateway errors

use relay_http::HttpError;
use thiserror::Error;

/// Gateway errors
///
/// Transport, protocol and session errors are handled by the shard's own
/// reconnect logic. Only `Fatal` (and `Http` while starting the manager) reach
/// the application.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Socket connect, read or write failed
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// A frame could not be understood
    #[error("Gateway protocol error: {0}")]
    Protocol(String),

    /// The platform invalidated the session
    #[error("Gateway session invalidated (resumable: {resumable})")]
    SessionInvalid { resumable: bool },

    /// The platform closed the connection with a code that cannot be recovered from
    #[error("Gateway closed with fatal code {code}: {reason}")]
    Fatal { code: u16, reason: String },

    /// Fetching gateway metadata failed
    #[error("Gateway metadata request failed: {0}")]
    Http(#[from] HttpError),

    /// Invalid shard configuration
    #[error("Invalid shard configuration: {0}")]
    InvalidShards(String),

    /// A presence update the platform would reject
    #[error("Invalid presence: {0}")]
    InvalidPresence(String),
}

impl GatewayError {
    /// Check if this error stops the shard
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::InvalidShards(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
