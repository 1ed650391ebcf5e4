//! # relay-core
//!
//! Domain layer containing snowflake IDs, gateway intents and the entity types
//! held by the client cache. This crate has no I/O and no async runtime.

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    CacheEntity, CacheKey, Channel, ChannelType, EntityKind, Guild, Member, Message, Role, User,
};
pub use error::EntityError;
pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
