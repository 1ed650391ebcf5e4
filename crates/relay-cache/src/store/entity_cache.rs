//! Entity cache
//!
//! One store per entity kind, each behind its own lock. Locks are always
//! taken in the order guilds, channels, messages, roles, members, users.
//! A parent store is held shared while a child is inserted and exclusive
//! while the parent is removed, so no cached child outlives its parent.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use parking_lot::RwLock;
use relay_common::CacheConfig;
use relay_core::{
    CacheEntity, CacheKey, Channel, EntityError, EntityKind, Guild, Member, Message, Role,
    Snowflake, User,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::message_store::MessageStore;
use crate::merge::merge_entity;

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The entity was not cached before
    Inserted,
    /// An existing entry was merged
    Updated,
    /// The owning parent is not cached; nothing was stored
    Orphaned,
}

impl UpsertOutcome {
    pub fn is_stored(self) -> bool {
        !matches!(self, Self::Orphaned)
    }
}

/// Entry counts per store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub guilds: usize,
    pub channels: usize,
    pub messages: usize,
    pub roles: usize,
    pub members: usize,
    pub users: usize,
}

type MemberKey = (Snowflake, Snowflake);

/// In-memory cache of platform entities
pub struct EntityCache {
    guilds: RwLock<HashMap<Snowflake, Guild>>,
    channels: RwLock<HashMap<Snowflake, Channel>>,
    messages: RwLock<MessageStore>,
    roles: RwLock<HashMap<Snowflake, Role>>,
    members: RwLock<HashMap<MemberKey, Member>>,
    users: RwLock<HashMap<Snowflake, User>>,
}

impl EntityCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_message_capacity(config.message_capacity)
    }

    pub fn with_message_capacity(message_capacity: usize) -> Self {
        Self {
            guilds: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            messages: RwLock::new(MessageStore::new(message_capacity)),
            roles: RwLock::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert an entity or merge it into the cached one
    ///
    /// Fields left `None` on `entity` keep their cached values.
    pub fn upsert(&self, entity: CacheEntity) -> Result<UpsertOutcome, EntityError> {
        let patch = entity.to_json()?;
        self.apply(entity, &patch)
    }

    /// Insert or merge an entity from its raw JSON representation
    ///
    /// Unlike [`upsert`](Self::upsert), an explicit `null` in `value` clears
    /// the cached field.
    pub fn upsert_json(&self, kind: EntityKind, value: Value) -> Result<UpsertOutcome, EntityError> {
        let entity = CacheEntity::from_json(kind, value.clone())?;
        self.apply(entity, &value)
    }

    fn apply(&self, entity: CacheEntity, patch: &Value) -> Result<UpsertOutcome, EntityError> {
        let key = entity.key();
        let outcome = match entity {
            CacheEntity::Guild(guild) => {
                let mut guilds = self.guilds.write();
                upsert_in(&mut guilds, guild.id, guild, patch, EntityKind::Guild)?
            }
            CacheEntity::Channel(channel) => {
                let guilds = self.guilds.read();
                if channel.guild_id.is_some_and(|id| !guilds.contains_key(&id)) {
                    UpsertOutcome::Orphaned
                } else {
                    let mut channels = self.channels.write();
                    upsert_in(&mut channels, channel.id, channel, patch, EntityKind::Channel)?
                }
            }
            CacheEntity::Message(message) => {
                let channels = self.channels.read();
                // DM messages are accepted without their channel
                if message.guild_id.is_some() && !channels.contains_key(&message.channel_id) {
                    UpsertOutcome::Orphaned
                } else {
                    let mut messages = self.messages.write();
                    if let Some(existing) = messages.get_mut(&message.id) {
                        *existing = merge_entity(existing, patch, EntityKind::Message)?;
                        UpsertOutcome::Updated
                    } else {
                        let evicted = messages.insert(message);
                        if evicted > 0 {
                            tracing::trace!(evicted, "Evicted messages past capacity");
                        }
                        UpsertOutcome::Inserted
                    }
                }
            }
            CacheEntity::Role(role) => {
                let guilds = self.guilds.read();
                if guilds.contains_key(&role.guild_id) {
                    let mut roles = self.roles.write();
                    upsert_in(&mut roles, role.id, role, patch, EntityKind::Role)?
                } else {
                    UpsertOutcome::Orphaned
                }
            }
            CacheEntity::Member(member) => {
                let guilds = self.guilds.read();
                if guilds.contains_key(&member.guild_id) {
                    let mut members = self.members.write();
                    let member_key = (member.guild_id, member.user_id);
                    upsert_in(&mut members, member_key, member, patch, EntityKind::Member)?
                } else {
                    UpsertOutcome::Orphaned
                }
            }
            CacheEntity::User(user) => {
                let mut users = self.users.write();
                upsert_in(&mut users, user.id, user, patch, EntityKind::User)?
            }
        };

        if outcome == UpsertOutcome::Orphaned {
            tracing::debug!(key = %key, "Rejected entity whose parent is not cached");
        }
        Ok(outcome)
    }

    /// Remove an entity and everything it owns
    ///
    /// Returns the removed entity, or `None` if it was not cached.
    pub fn remove(&self, key: CacheKey) -> Option<CacheEntity> {
        match key {
            CacheKey::Guild(id) => {
                let mut guilds = self.guilds.write();
                let guild = guilds.remove(&id)?;
                self.cascade_guilds(&HashSet::from([id]));
                drop(guilds);
                Some(guild.into())
            }
            CacheKey::Channel(id) => {
                let mut channels = self.channels.write();
                let channel = channels.remove(&id)?;
                let removed = self.messages.write().retain(|m| m.channel_id != id);
                tracing::trace!(channel_id = %id, messages = removed, "Removed channel");
                drop(channels);
                Some(channel.into())
            }
            CacheKey::Message(id) => self.messages.write().remove(&id).map(Into::into),
            CacheKey::Role(id) => self.roles.write().remove(&id).map(Into::into),
            CacheKey::Member { guild_id, user_id } => self
                .members
                .write()
                .remove(&(guild_id, user_id))
                .map(Into::into),
            CacheKey::User(id) => self.users.write().remove(&id).map(Into::into),
        }
    }

    /// Remove every guild owned by a shard, with all of its children
    ///
    /// Returns the number of guilds removed.
    pub fn purge_shard(&self, shard_id: u32, total_shards: u32) -> usize {
        let mut guilds = self.guilds.write();
        let owned: HashSet<Snowflake> = guilds
            .keys()
            .filter(|id| id.shard_id(total_shards) == shard_id)
            .copied()
            .collect();
        if owned.is_empty() {
            return 0;
        }

        guilds.retain(|id, _| !owned.contains(id));
        self.cascade_guilds(&owned);
        drop(guilds);

        tracing::debug!(shard_id, total_shards, guilds = owned.len(), "Purged shard guilds");
        owned.len()
    }

    /// Drop the children of guilds that were just removed
    ///
    /// Caller holds the guilds write lock.
    fn cascade_guilds(&self, guild_ids: &HashSet<Snowflake>) {
        let mut channels = self.channels.write();
        let mut messages = self.messages.write();
        let mut roles = self.roles.write();
        let mut members = self.members.write();

        let mut dropped_channels = HashSet::new();
        channels.retain(|id, channel| {
            let owned = channel.guild_id.is_some_and(|g| guild_ids.contains(&g));
            if owned {
                dropped_channels.insert(*id);
            }
            !owned
        });
        messages.retain(|m| {
            !dropped_channels.contains(&m.channel_id)
                && !m.guild_id.is_some_and(|g| guild_ids.contains(&g))
        });
        roles.retain(|_, role| !guild_ids.contains(&role.guild_id));
        members.retain(|(guild_id, _), _| !guild_ids.contains(guild_id));
    }

    /// Remove everything
    pub fn clear(&self) {
        let mut guilds = self.guilds.write();
        let mut channels = self.channels.write();
        let mut messages = self.messages.write();
        let mut roles = self.roles.write();
        let mut members = self.members.write();
        let mut users = self.users.write();
        guilds.clear();
        channels.clear();
        messages.clear();
        roles.clear();
        members.clear();
        users.clear();
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up any entity by key
    pub fn get(&self, key: CacheKey) -> Option<CacheEntity> {
        match key {
            CacheKey::Guild(id) => self.guild(id).map(Into::into),
            CacheKey::Channel(id) => self.channel(id).map(Into::into),
            CacheKey::Role(id) => self.role(id).map(Into::into),
            CacheKey::Member { guild_id, user_id } => {
                self.member(guild_id, user_id).map(Into::into)
            }
            CacheKey::User(id) => self.user(id).map(Into::into),
            CacheKey::Message(id) => self.message(id).map(Into::into),
        }
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        match key {
            CacheKey::Guild(id) => self.guilds.read().contains_key(&id),
            CacheKey::Channel(id) => self.channels.read().contains_key(&id),
            CacheKey::Role(id) => self.roles.read().contains_key(&id),
            CacheKey::Member { guild_id, user_id } => {
                self.members.read().contains_key(&(guild_id, user_id))
            }
            CacheKey::User(id) => self.users.read().contains_key(&id),
            CacheKey::Message(id) => self.messages.read().get(&id).is_some(),
        }
    }

    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.guilds.read().get(&id).cloned()
    }

    pub fn channel(&self, id: Snowflake) -> Option<Channel> {
        self.channels.read().get(&id).cloned()
    }

    pub fn role(&self, id: Snowflake) -> Option<Role> {
        self.roles.read().get(&id).cloned()
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members.read().get(&(guild_id, user_id)).cloned()
    }

    pub fn user(&self, id: Snowflake) -> Option<User> {
        self.users.read().get(&id).cloned()
    }

    pub fn message(&self, id: Snowflake) -> Option<Message> {
        self.messages.read().get(&id).cloned()
    }

    /// Snapshot of all cached guilds
    pub fn guilds(&self) -> Vec<Guild> {
        self.guilds.read().values().cloned().collect()
    }

    /// Snapshot of all cached channels, DMs included
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.read().values().cloned().collect()
    }

    pub fn users(&self) -> Vec<User> {
        self.users.read().values().cloned().collect()
    }

    pub fn guild_channels(&self, guild_id: Snowflake) -> Vec<Channel> {
        self.channels
            .read()
            .values()
            .filter(|c| c.guild_id == Some(guild_id))
            .cloned()
            .collect()
    }

    pub fn guild_roles(&self, guild_id: Snowflake) -> Vec<Role> {
        self.roles
            .read()
            .values()
            .filter(|r| r.guild_id == guild_id)
            .cloned()
            .collect()
    }

    pub fn guild_members(&self, guild_id: Snowflake) -> Vec<Member> {
        self.members
            .read()
            .values()
            .filter(|m| m.guild_id == guild_id)
            .cloned()
            .collect()
    }

    /// Cached messages of a channel, oldest ID first
    pub fn channel_messages(&self, channel_id: Snowflake) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .values()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.id);
        messages
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            guilds: self.guilds.read().len(),
            channels: self.channels.read().len(),
            messages: self.messages.read().len(),
            roles: self.roles.read().len(),
            members: self.members.read().len(),
            users: self.users.read().len(),
        }
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("stats", &self.stats())
            .finish()
    }
}

fn upsert_in<K, T>(
    store: &mut HashMap<K, T>,
    key: K,
    incoming: T,
    patch: &Value,
    kind: EntityKind,
) -> Result<UpsertOutcome, EntityError>
where
    K: Eq + Hash,
    T: Serialize + DeserializeOwned,
{
    if let Some(existing) = store.get_mut(&key) {
        *existing = merge_entity(existing, patch, kind)?;
        Ok(UpsertOutcome::Updated)
    } else {
        store.insert(key, incoming);
        Ok(UpsertOutcome::Inserted)
    }
}
