//! Role entity - a guild role

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Role entity
///
/// Role payloads on the wire do not carry their guild; the gateway layer
/// fills `guild_id` from the surrounding event before caching.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hoist: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    /// Permission bitset, sent as a decimal string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentionable: Option<bool>,
}

impl Role {
    pub fn new(id: Snowflake, guild_id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The @everyone role shares its ID with the guild
    #[inline]
    pub fn is_everyone(&self) -> bool {
        self.id == self.guild_id
    }

    /// Parsed permission bits, if present and well-formed
    pub fn permission_bits(&self) -> Option<u64> {
        self.permissions.as_deref().and_then(|p| p.parse().ok())
    }

    /// `<@&id>` mention string
    pub fn mention(&self) -> String {
        format!("<@&{}>", self.id)
    }
}
