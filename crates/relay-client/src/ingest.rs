//! Storing REST responses in the cache
//!
//! REST payloads nest users inside members and messages; the cache keeps
//! them in the user store and references them by ID.

use relay_cache::EntityCache;
use relay_core::{CacheEntity, EntityKind, Guild, Member, Message, Snowflake, User};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

fn user_of(value: &Value, field: &str) -> ClientResult<Option<User>> {
    match value.get(field) {
        Some(user) if user.is_object() => {
            let entity = CacheEntity::from_json(EntityKind::User, user.clone())?;
            Ok(entity.as_user().cloned())
        }
        _ => Ok(None),
    }
}

fn decoded<T, F>(entity: &CacheEntity, project: F) -> ClientResult<T>
where
    T: Clone,
    F: Fn(&CacheEntity) -> Option<&T>,
{
    project(entity)
        .cloned()
        .ok_or_else(|| ClientError::InvalidResponse(format!("expected {}", entity.kind())))
}

pub(crate) fn store_user(cache: &EntityCache, value: Value) -> ClientResult<User> {
    let entity = CacheEntity::from_json(EntityKind::User, value.clone())?;
    let user = decoded(&entity, CacheEntity::as_user)?;
    cache.upsert_json(EntityKind::User, value)?;
    Ok(user)
}

/// Store a guild and the roles it carries
pub(crate) fn store_guild(cache: &EntityCache, mut value: Value) -> ClientResult<Guild> {
    let roles = value
        .as_object_mut()
        .and_then(|object| {
            object.remove("channels");
            object.remove("members");
            object.remove("roles")
        })
        .and_then(|roles| match roles {
            Value::Array(roles) => Some(roles),
            _ => None,
        })
        .unwrap_or_default();

    let entity = CacheEntity::from_json(EntityKind::Guild, value.clone())?;
    let guild = decoded(&entity, CacheEntity::as_guild)?;
    cache.upsert_json(EntityKind::Guild, value)?;

    for mut role in roles {
        if let Some(object) = role.as_object_mut() {
            object.insert("guild_id".into(), Value::String(guild.id.to_string()));
        }
        if let Err(e) = cache.upsert_json(EntityKind::Role, role) {
            tracing::warn!(guild_id = %guild.id, error = %e, "Skipped malformed role");
        }
    }
    Ok(guild)
}

pub(crate) fn store_member(
    cache: &EntityCache,
    guild_id: Snowflake,
    mut value: Value,
) -> ClientResult<Member> {
    let user = user_of(&value, "user")?
        .ok_or_else(|| ClientError::InvalidResponse("member without user".to_string()))?;
    cache.upsert(user.clone().into())?;

    if let Some(object) = value.as_object_mut() {
        object.remove("user");
        object.insert("guild_id".into(), Value::String(guild_id.to_string()));
        object.insert("user_id".into(), Value::String(user.id.to_string()));
    }
    let entity = CacheEntity::from_json(EntityKind::Member, value.clone())?;
    let member = decoded(&entity, CacheEntity::as_member)?;
    cache.upsert_json(EntityKind::Member, value)?;
    Ok(member)
}

pub(crate) fn store_message(cache: &EntityCache, mut value: Value) -> ClientResult<Message> {
    let author = user_of(&value, "author")?;
    if let Some(author) = &author {
        cache.upsert(author.clone().into())?;
    }

    if let Some(object) = value.as_object_mut() {
        object.remove("author");
        object.remove("member");
        if let Some(author) = &author {
            object.insert("author_id".into(), Value::String(author.id.to_string()));
        }
    }
    let entity = CacheEntity::from_json(EntityKind::Message, value.clone())?;
    let message = decoded(&entity, CacheEntity::as_message)?;
    cache.upsert_json(EntityKind::Message, value)?;
    Ok(message)
}
