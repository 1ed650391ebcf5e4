//! HTTP errors

use std::time::Duration;

use thiserror::Error;

/// Failure to get any response from the server
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Errors surfaced by the request dispatcher
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Rate limited on {bucket} (retry after {retry_after:?}, global: {global})")]
    RateLimited {
        bucket: String,
        retry_after: Duration,
        global: bool,
    },

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Request cancelled by shutdown")]
    Cancelled,
}

impl HttpError {
    /// HTTP status code, if the error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
