//! User entity - a platform account as seen by the client

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// User entity
///
/// Users are not owned by any guild; members reference them by ID.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<bool>,
}

impl User {
    /// Create a user with only an ID and username
    pub fn new(id: Snowflake, username: impl Into<String>) -> Self {
        Self {
            id,
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// Name shown in clients: global name, then username
    pub fn display_name(&self) -> Option<&str> {
        self.global_name.as_deref().or(self.username.as_deref())
    }

    /// Legacy `username#discriminator` tag, if both parts are known
    pub fn tag(&self) -> Option<String> {
        match (&self.username, &self.discriminator) {
            (Some(name), Some(disc)) if disc != "0" => Some(format!("{name}#{disc}")),
            (Some(name), _) => Some(name.clone()),
            _ => None,
        }
    }

    /// Whether the account is a bot (unknown counts as false)
    #[inline]
    pub fn is_bot(&self) -> bool {
        self.bot.unwrap_or(false)
    }

    /// CDN path of the avatar, if one is set
    pub fn avatar_path(&self) -> Option<String> {
        self.avatar
            .as_ref()
            .map(|hash| format!("/avatars/{}/{}.png", self.id, hash))
    }
}
