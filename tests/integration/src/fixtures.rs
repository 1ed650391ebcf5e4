//! Test fixtures
//!
//! Configuration and gateway payloads shared by the integration tests.

use std::collections::HashMap;

use relay_common::ClientConfig;
use serde_json::{json, Value};

/// Token the fake REST server accepts
pub const TOKEN: &str = "secret";

/// ID of the bot user
pub const BOT_ID: &str = "100";

/// Client configuration pointing at the fake servers
///
/// Shards connect a few milliseconds apart and reconnect after 50 ms.
pub fn test_config(rest_url: &str, gateway_url: &str, shard_count: &str) -> ClientConfig {
    config_with(rest_url, gateway_url, shard_count, &[])
}

/// Like [`test_config`], with extra variables layered on top
pub fn config_with(
    rest_url: &str,
    gateway_url: &str,
    shard_count: &str,
    extra: &[(&str, &str)],
) -> ClientConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("BOT_TOKEN".into(), TOKEN.into()),
        ("APP_ENV".into(), "development".into()),
        ("API_BASE_URL".into(), rest_url.into()),
        ("GATEWAY_URL".into(), gateway_url.into()),
        ("SHARD_COUNT".into(), shard_count.into()),
        ("IDENTIFY_INTERVAL_MS".into(), "10".into()),
        ("RECONNECT_FLOOR_MS".into(), "50".into()),
        ("RECONNECT_CAP_MS".into(), "200".into()),
        ("HTTP_TIMEOUT_SECS".into(), "5".into()),
    ]);
    for (key, value) in extra {
        vars.insert((*key).into(), (*value).into());
    }
    match ClientConfig::from_lookup(|key| vars.get(key).cloned()) {
        Ok(config) => config,
        Err(e) => panic!("invalid test config: {e}"),
    }
}

pub fn bot_user() -> Value {
    json!({
        "id": BOT_ID,
        "username": "relay",
        "discriminator": "0",
        "bot": true
    })
}

/// READY body for one shard
pub fn ready(session_id: &str, resume_url: &str, shard: [u32; 2], guild_ids: &[&str]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({"id": id, "unavailable": true}))
        .collect();
    json!({
        "v": 10,
        "session_id": session_id,
        "resume_gateway_url": resume_url,
        "user": bot_user(),
        "guilds": guilds,
        "shard": shard
    })
}

/// GUILD_CREATE body with one text channel, one role and the bot as member
pub fn guild(id: &str, channel_id: &str, role_id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("guild-{id}"),
        "owner_id": BOT_ID,
        "member_count": 1,
        "roles": [{"id": role_id, "name": "@everyone", "permissions": "0", "position": 0}],
        "channels": [{"id": channel_id, "type": 0, "name": "general", "position": 0}],
        "members": [{"user": bot_user(), "roles": [], "joined_at": "2024-01-01T00:00:00+00:00"}]
    })
}

/// MESSAGE_CREATE body
pub fn message(id: &str, channel_id: &str, guild_id: Option<&str>, content: &str) -> Value {
    let mut message = json!({
        "id": id,
        "channel_id": channel_id,
        "content": content,
        "author": {"id": "200", "username": "someone"},
        "timestamp": "2024-01-01T00:00:00+00:00"
    });
    if let Some(guild_id) = guild_id {
        message["guild_id"] = json!(guild_id);
    }
    message
}
