//! Client errors

use relay_common::ConfigError;
use relay_core::EntityError;
use relay_gateway::GatewayError;
use relay_http::{HttpError, TransportError};
use thiserror::Error;

/// Errors surfaced by [`Client`](crate::Client)
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error("Failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("The client is already running")]
    AlreadyStarted,

    #[error("The client has been shut down")]
    Closed,
}

impl ClientError {
    /// Check if the error means the token was rejected
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Http(e) => e.is_unauthorized(),
            Self::Gateway(GatewayError::Fatal { code, .. }) => *code == 4004,
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
