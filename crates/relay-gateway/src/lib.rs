//! # relay-gateway
//!
//! Gateway client: one WebSocket connection per shard, kept alive with
//! heartbeats and resumed after drops.
//!
//! ## Features
//!
//! - **Session resume**: dropped connections resume with the last sequence,
//!   invalid sessions fall back to a fresh identify
//! - **Close codes**: each close code maps to resume, re-identify or stop
//! - **Sharding**: a supervisor per shard and an identify gate per
//!   concurrency bucket
//! - **Cache sync**: dispatches update the [`relay_cache::EntityCache`]
//!   before handlers run
//! - **Events**: name-keyed handlers with `on`, `once`, `replace` and
//!   `wait_for`
//!
//! ## Example
//!
//! ```ignore
//! use relay_gateway::{EventRegistry, ShardManager, TungsteniteConnector};
//!
//! let events = EventRegistry::new();
//! events.on("MESSAGE_CREATE", |event| println!("{}", event.data));
//!
//! let manager = ShardManager::connect(
//!     &config,
//!     &dispatcher,
//!     Arc::new(TungsteniteConnector),
//!     cache,
//!     events,
//! )
//! .await?;
//! ```

pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;
pub mod shard;

#[cfg(test)]
mod testing;

pub use connection::{
    ConnectionConfig, ConnectionStatus, Connector, GatewayConnection, GatewaySocket, ShardContext,
    ShardExit, ShardState, SocketEvent, TungsteniteConnector,
};
pub use error::GatewayError;
pub use events::{
    apply_event, EventHandler, EventRegistry, GatewayEvent, GatewayEventType, SubscriptionHandle,
};
pub use protocol::{CloseAction, CloseCode, GatewayMessage, OpCode, PresenceUpdatePayload};
pub use shard::{IdentifyGate, ShardManager, ShardPlan};
