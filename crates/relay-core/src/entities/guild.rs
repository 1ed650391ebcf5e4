//! Guild entity - represents a server

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Guild (server) entity
///
/// A guild owns its channels, roles and members; removing it from the cache
/// removes them too.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    /// Set while the guild is in an outage or not yet streamed after Ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<bool>,
}

impl Guild {
    /// Create a guild with a name
    pub fn new(id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Placeholder for a guild announced in Ready before its GUILD_CREATE
    pub fn unavailable(id: Snowflake) -> Self {
        Self {
            id,
            unavailable: Some(true),
            ..Self::default()
        }
    }

    /// Check if a user is the guild owner
    #[inline]
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owner_id == Some(user_id)
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        !self.unavailable.unwrap_or(false)
    }

    /// Shard that receives this guild's events
    #[inline]
    pub fn shard_id(&self, total_shards: u32) -> u32 {
        self.id.shard_id(total_shards)
    }

    /// CDN path of the guild icon, if one is set
    pub fn icon_path(&self) -> Option<String> {
        self.icon
            .as_ref()
            .map(|hash| format!("/icons/{}/{}.png", self.id, hash))
    }
}
