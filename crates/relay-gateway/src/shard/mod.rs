//! Sharding
//!
//! [`ShardManager`] runs one supervised [`GatewayConnection`](crate::connection::GatewayConnection)
//! per shard; [`IdentifyGate`] keeps their identifies within the platform's
//! concurrency limit.

mod identify_gate;
mod manager;

pub use identify_gate::IdentifyGate;
pub use manager::{ShardManager, ShardPlan};
