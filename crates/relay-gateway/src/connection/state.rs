//! Shard connection state
//!
//! A snapshot of each shard is published through a `watch` channel for
//! monitoring.

use serde::Serialize;
use std::fmt;

/// Where a shard is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionStatus {
    /// No socket
    Disconnected,
    /// Opening the socket
    Connecting,
    /// Waiting for an identify slot or the READY dispatch
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// Receiving dispatches
    Ready,
    /// Socket closed, waiting out the reconnect backoff
    Reconnecting,
}

impl ConnectionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
        }
    }

    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published state of one shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardState {
    pub shard_id: u32,
    pub total_shards: u32,
    pub status: ConnectionStatus,
    /// Whether the last heartbeat sent has been acknowledged
    pub last_heartbeat_ack: bool,
    /// From the last Hello, 0 before the first one
    pub heartbeat_interval_ms: u64,
    /// Last dispatch sequence seen
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    /// Consecutive failed connection attempts
    pub reconnect_attempts: u32,
}

impl ShardState {
    pub fn new(shard_id: u32, total_shards: u32) -> Self {
        Self {
            shard_id,
            total_shards,
            status: ConnectionStatus::Disconnected,
            last_heartbeat_ack: true,
            heartbeat_interval_ms: 0,
            sequence: None,
            session_id: None,
            reconnect_attempts: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }
}
