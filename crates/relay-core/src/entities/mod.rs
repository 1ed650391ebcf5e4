//! Cached entities - the closed set of objects the client keeps in memory

mod channel;
mod guild;
mod member;
mod message;
mod role;
mod user;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EntityError;
use crate::value_objects::Snowflake;

pub use channel::{Channel, ChannelType};
pub use guild::Guild;
pub use member::Member;
pub use message::Message;
pub use role::Role;
pub use user::User;

/// Entity kind, one per cache store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Guild,
    Channel,
    Role,
    Member,
    User,
    Message,
}

impl EntityKind {
    /// Get the kind name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Member => "member",
            Self::User => "user",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cache lookup key
///
/// Members are the only entity without a single ID of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Guild(Snowflake),
    Channel(Snowflake),
    Role(Snowflake),
    Member { guild_id: Snowflake, user_id: Snowflake },
    User(Snowflake),
    Message(Snowflake),
}

impl CacheKey {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
            Self::Role(_) => EntityKind::Role,
            Self::Member { .. } => EntityKind::Member,
            Self::User(_) => EntityKind::User,
            Self::Message(_) => EntityKind::Message,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member { guild_id, user_id } => write!(f, "member:{guild_id}/{user_id}"),
            Self::Guild(id)
            | Self::Channel(id)
            | Self::Role(id)
            | Self::User(id)
            | Self::Message(id) => write!(f, "{}:{id}", self.kind()),
        }
    }
}

/// A cached entity
///
/// Guilds own channels, roles and members; channels own messages. Members
/// reference their user by ID without owning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntity {
    Guild(Guild),
    Channel(Channel),
    Role(Role),
    Member(Member),
    User(User),
    Message(Message),
}

impl CacheEntity {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
            Self::Role(_) => EntityKind::Role,
            Self::Member(_) => EntityKind::Member,
            Self::User(_) => EntityKind::User,
            Self::Message(_) => EntityKind::Message,
        }
    }

    pub const fn key(&self) -> CacheKey {
        match self {
            Self::Guild(g) => CacheKey::Guild(g.id),
            Self::Channel(c) => CacheKey::Channel(c.id),
            Self::Role(r) => CacheKey::Role(r.id),
            Self::Member(m) => CacheKey::Member {
                guild_id: m.guild_id,
                user_id: m.user_id,
            },
            Self::User(u) => CacheKey::User(u.id),
            Self::Message(m) => CacheKey::Message(m.id),
        }
    }

    /// Key of the owning parent, if this entity has one
    ///
    /// DM channels and users have no owner. A message's owner is its channel.
    pub const fn parent(&self) -> Option<CacheKey> {
        match self {
            Self::Channel(c) => match c.guild_id {
                Some(guild_id) => Some(CacheKey::Guild(guild_id)),
                None => None,
            },
            Self::Role(r) => Some(CacheKey::Guild(r.guild_id)),
            Self::Member(m) => Some(CacheKey::Guild(m.guild_id)),
            Self::Message(m) => Some(CacheKey::Channel(m.channel_id)),
            Self::Guild(_) | Self::User(_) => None,
        }
    }

    /// Decode an entity of the given kind from its JSON representation
    pub fn from_json(kind: EntityKind, value: Value) -> Result<Self, EntityError> {
        if !value.is_object() {
            return Err(EntityError::NotAnObject(kind));
        }

        let decode = |source| EntityError::Decode { kind, source };
        Ok(match kind {
            EntityKind::Guild => Self::Guild(serde_json::from_value(value).map_err(decode)?),
            EntityKind::Channel => Self::Channel(serde_json::from_value(value).map_err(decode)?),
            EntityKind::Role => Self::Role(serde_json::from_value(value).map_err(decode)?),
            EntityKind::Member => Self::Member(serde_json::from_value(value).map_err(decode)?),
            EntityKind::User => Self::User(serde_json::from_value(value).map_err(decode)?),
            EntityKind::Message => Self::Message(serde_json::from_value(value).map_err(decode)?),
        })
    }

    /// Encode the entity; `None` fields are omitted
    pub fn to_json(&self) -> Result<Value, EntityError> {
        let encoded = match self {
            Self::Guild(e) => serde_json::to_value(e),
            Self::Channel(e) => serde_json::to_value(e),
            Self::Role(e) => serde_json::to_value(e),
            Self::Member(e) => serde_json::to_value(e),
            Self::User(e) => serde_json::to_value(e),
            Self::Message(e) => serde_json::to_value(e),
        };
        encoded.map_err(|source| EntityError::Encode {
            kind: self.kind(),
            source,
        })
    }

    pub fn as_guild(&self) -> Option<&Guild> {
        match self {
            Self::Guild(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_role(&self) -> Option<&Role> {
        match self {
            Self::Role(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&Member> {
        match self {
            Self::Member(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }
}

macro_rules! impl_from_entity {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for CacheEntity {
                fn from(entity: $variant) -> Self {
                    Self::$variant(entity)
                }
            }
        )*
    };
}

impl_from_entity!(Guild, Channel, Role, Member, User, Message);
