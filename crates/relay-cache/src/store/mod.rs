//! Entity stores

mod entity_cache;
mod message_store;

pub use entity_cache::{CacheStats, EntityCache, UpsertOutcome};
