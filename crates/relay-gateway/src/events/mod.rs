//! Gateway events
//!
//! Decoded dispatch events, the handler registry and cache synchronisation.

mod cache_sync;
mod event;
mod event_types;
mod registry;

pub use cache_sync::apply_event;
pub use event::GatewayEvent;
pub use event_types::GatewayEventType;
pub use registry::{EventHandler, EventRegistry, SubscriptionHandle};
