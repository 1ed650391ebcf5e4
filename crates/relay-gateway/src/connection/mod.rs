//! Shard connections
//!
//! One [`GatewayConnection`] per shard: socket transport, heartbeat, session
//! resume and reconnect backoff.

mod backoff;
mod connection;
mod session;
mod socket;
mod state;

pub use backoff::Backoff;
pub use connection::{ConnectionConfig, GatewayConnection, ShardContext, ShardExit};
pub use session::Session;
pub use socket::{gateway_url, Connector, GatewaySocket, SocketEvent, TungsteniteConnector, API_VERSION};
pub use state::{ConnectionStatus, ShardState};
