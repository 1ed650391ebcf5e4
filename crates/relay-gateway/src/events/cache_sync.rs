//! Applying dispatch events to the entity cache
//!
//! Runs on the shard task before an event reaches handlers. Payloads that do
//! not decode are logged and skipped; they never fail the connection.

use relay_cache::EntityCache;
use relay_core::{CacheKey, EntityError, EntityKind, Snowflake};
use serde_json::{Map, Value};

use super::{GatewayEvent, GatewayEventType};

/// Apply one dispatch event to the cache
///
/// Returns the number of entities stored or removed.
pub fn apply_event(cache: &EntityCache, event: &GatewayEvent) -> usize {
    let Some(kind) = event.kind() else {
        return 0;
    };
    let data = &event.data;
    let mut sync = CacheWriter { cache, changed: 0 };

    match kind {
        GatewayEventType::Ready => {
            if let Some(user) = data.get("user") {
                sync.upsert(EntityKind::User, user.clone());
            }
            for guild in array(data, "guilds") {
                sync.upsert(EntityKind::Guild, guild.clone());
            }
        }
        GatewayEventType::GuildCreate | GatewayEventType::GuildUpdate => sync.guild(data),
        GatewayEventType::GuildDelete => {
            let Some(id) = id_of(data, "id") else {
                return 0;
            };
            // an outage keeps the guild cached, marked unavailable
            if data.get("unavailable").and_then(Value::as_bool) == Some(true) {
                sync.upsert(
                    EntityKind::Guild,
                    serde_json::json!({ "id": id, "unavailable": true }),
                );
            } else {
                sync.remove(CacheKey::Guild(id));
            }
        }
        GatewayEventType::ChannelCreate | GatewayEventType::ChannelUpdate => {
            sync.upsert(EntityKind::Channel, data.clone());
        }
        GatewayEventType::ChannelDelete => {
            if let Some(id) = id_of(data, "id") {
                sync.remove(CacheKey::Channel(id));
            }
        }
        GatewayEventType::GuildRoleCreate | GatewayEventType::GuildRoleUpdate => {
            if let (Some(guild_id), Some(role)) = (id_of(data, "guild_id"), data.get("role")) {
                sync.role(guild_id, role);
            }
        }
        GatewayEventType::GuildRoleDelete => {
            if let Some(id) = id_of(data, "role_id") {
                sync.remove(CacheKey::Role(id));
            }
        }
        GatewayEventType::GuildMemberAdd | GatewayEventType::GuildMemberUpdate => {
            if let Some(guild_id) = id_of(data, "guild_id") {
                sync.member(guild_id, data);
            }
        }
        GatewayEventType::GuildMemberRemove => {
            let guild_id = id_of(data, "guild_id");
            let user_id = data.get("user").and_then(|u| id_of(u, "id"));
            if let (Some(guild_id), Some(user_id)) = (guild_id, user_id) {
                sync.remove(CacheKey::Member { guild_id, user_id });
            }
        }
        GatewayEventType::GuildMembersChunk => {
            if let Some(guild_id) = id_of(data, "guild_id") {
                for member in array(data, "members") {
                    sync.member(guild_id, member);
                }
            }
        }
        GatewayEventType::MessageCreate | GatewayEventType::MessageUpdate => sync.message(data),
        GatewayEventType::MessageDelete => {
            if let Some(id) = id_of(data, "id") {
                sync.remove(CacheKey::Message(id));
            }
        }
        GatewayEventType::MessageDeleteBulk => {
            for id in array(data, "ids").filter_map(|v| v.as_str()?.parse().ok()) {
                sync.remove(CacheKey::Message(id));
            }
        }
        GatewayEventType::UserUpdate => sync.upsert(EntityKind::User, data.clone()),
        GatewayEventType::Resumed
        | GatewayEventType::PresenceUpdate
        | GatewayEventType::TypingStart => {}
    }

    sync.changed
}

struct CacheWriter<'a> {
    cache: &'a EntityCache,
    changed: usize,
}

impl CacheWriter<'_> {
    fn upsert(&mut self, kind: EntityKind, value: Value) {
        match self.cache.upsert_json(kind, value) {
            Ok(outcome) if outcome.is_stored() => self.changed += 1,
            Ok(_) => {}
            Err(e) => log_skipped(kind, &e),
        }
    }

    fn remove(&mut self, key: CacheKey) {
        if self.cache.remove(key).is_some() {
            self.changed += 1;
        }
    }

    fn guild(&mut self, data: &Value) {
        let Some(guild_id) = id_of(data, "id") else {
            return;
        };

        let mut guild = data.clone();
        if let Some(object) = guild.as_object_mut() {
            for nested in ["channels", "threads", "roles", "members", "presences"] {
                object.remove(nested);
            }
        }
        self.upsert(EntityKind::Guild, guild);

        for channel in array(data, "channels").chain(array(data, "threads")) {
            self.upsert(EntityKind::Channel, with_field(channel, "guild_id", guild_id));
        }
        for role in array(data, "roles") {
            self.role(guild_id, role);
        }
        for member in array(data, "members") {
            self.member(guild_id, member);
        }
    }

    fn role(&mut self, guild_id: Snowflake, role: &Value) {
        self.upsert(EntityKind::Role, with_field(role, "guild_id", guild_id));
    }

    /// Members carry a nested user object; it goes to the user store and the
    /// member keeps only its id
    fn member(&mut self, guild_id: Snowflake, data: &Value) {
        let Some(user) = data.get("user") else {
            return;
        };
        let Some(user_id) = id_of(user, "id") else {
            return;
        };
        self.upsert(EntityKind::User, user.clone());

        let mut member = with_field(data, "guild_id", guild_id);
        if let Some(object) = member.as_object_mut() {
            object.remove("user");
            object.insert("user_id".into(), Value::String(user_id.to_string()));
        }
        self.upsert(EntityKind::Member, member);
    }

    fn message(&mut self, data: &Value) {
        let mut message = data.clone();
        let author_id = data.get("author").and_then(|a| id_of(a, "id"));

        if let Some(author) = data.get("author") {
            if author_id.is_some() {
                self.upsert(EntityKind::User, author.clone());
            }
        }
        if let Some(object) = message.as_object_mut() {
            object.remove("author");
            object.remove("member");
            if let Some(author_id) = author_id {
                object.insert("author_id".into(), Value::String(author_id.to_string()));
            }
        }
        self.upsert(EntityKind::Message, message);

        // guild messages carry a partial member for the author
        if let (Some(guild_id), Some(author_id), Some(member)) =
            (id_of(data, "guild_id"), author_id, data.get("member"))
        {
            let mut member = with_field(member, "guild_id", guild_id);
            if let Some(object) = member.as_object_mut() {
                object.insert("user_id".into(), Value::String(author_id.to_string()));
            }
            self.upsert(EntityKind::Member, member);
        }
    }
}

fn id_of(value: &Value, field: &str) -> Option<Snowflake> {
    match value.get(field)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(Snowflake::new),
        _ => None,
    }
}

fn array<'a>(value: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn with_field(value: &Value, field: &str, id: Snowflake) -> Value {
    let mut object = value.as_object().cloned().unwrap_or_else(Map::new);
    object.insert(field.into(), Value::String(id.to_string()));
    Value::Object(object)
}

fn log_skipped(kind: EntityKind, error: &EntityError) {
    tracing::warn!(kind = %kind, error = %error, "Skipped undecodable entity in dispatch");
}
