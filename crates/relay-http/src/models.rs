//! Response models used by the client itself

use relay_core::{Channel, Guild, Snowflake, User};
use serde::Deserialize;
use serde_json::Value;

/// `GET /gateway/bot` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBotInfo {
    pub url: String,
    /// Recommended shard count
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// Identify budget for the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until the budget resets
    pub reset_after: u64,
    pub max_concurrency: u32,
}

/// `GET /invites/{code}` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Invite {
    pub code: String,
    /// Partial guild, absent for group DM invites
    #[serde(default)]
    pub guild: Option<Guild>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub inviter: Option<User>,
    #[serde(default)]
    pub target_type: Option<u8>,
    #[serde(default)]
    pub target_user: Option<User>,
    #[serde(default)]
    pub uses: Option<u32>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Seconds, 0 for never
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Only with `with_counts=true`
    #[serde(default)]
    pub approximate_presence_count: Option<u64>,
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
}

impl Invite {
    pub fn guild_id(&self) -> Option<Snowflake> {
        self.guild.as_ref().map(|guild| guild.id)
    }

    pub fn channel_id(&self) -> Option<Snowflake> {
        self.channel.as_ref().map(|channel| channel.id)
    }
}

/// `GET /guilds/templates/{code}` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuildTemplate {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage_count: u32,
    pub creator_id: Snowflake,
    #[serde(default)]
    pub creator: Option<User>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub source_guild_id: Snowflake,
    /// Guild snapshot the template was taken from, kept as raw JSON
    #[serde(default)]
    pub serialized_source_guild: Value,
    /// Whether the source guild changed since the snapshot
    #[serde(default)]
    pub is_dirty: Option<bool>,
}
