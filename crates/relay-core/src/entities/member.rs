//! Member entity - a user's membership in a guild

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Guild member entity
///
/// Keyed by `(guild_id, user_id)`. The user itself lives in the user store;
/// a member only holds its ID.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Member {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Snowflake>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

impl Member {
    pub fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            guild_id,
            user_id,
            ..Self::default()
        }
    }

    /// Display name: nickname if set, otherwise the given fallback
    pub fn display_name<'a>(&'a self, username: &'a str) -> &'a str {
        self.nick.as_deref().unwrap_or(username)
    }

    /// Check if member has a specific role
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.roles
            .as_ref()
            .is_some_and(|roles| roles.contains(&role_id))
    }

    /// Role IDs, empty when unknown
    pub fn role_ids(&self) -> &[Snowflake] {
        self.roles.as_deref().unwrap_or_default()
    }

    /// `<@id>` mention string
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}
