//! # relay-cache
//!
//! In-memory entity cache for guilds, channels, roles, members, users and
//! messages.
//!
//! ## Features
//!
//! - **Partial merge**: updates replace only the fields they carry
//! - **Ownership**: children of an uncached parent are rejected, removing a
//!   parent removes its children
//! - **Shard purge**: a shard's guilds can be dropped before a fresh Ready
//! - **Bounded messages**: the message store evicts oldest-first
//!
//! ## Example
//!
//! ```ignore
//! use relay_cache::EntityCache;
//! use relay_core::{CacheKey, Guild, Snowflake};
//!
//! let cache = EntityCache::default();
//! cache.upsert(Guild::new(Snowflake::new(1), "guild").into())?;
//! assert!(cache.get(CacheKey::Guild(Snowflake::new(1))).is_some());
//! ```

pub mod merge;
pub mod store;

pub use merge::merge_json;
pub use store::{CacheStats, EntityCache, UpsertOutcome};
