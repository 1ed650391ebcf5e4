//! Gateway payload definitions
//!
//! Typed `d` bodies for the frames a shard sends and the few it inspects.

use relay_core::{Guild, Intents, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,

    /// Raw intent bits
    pub intents: u64,

    /// `[shard_id, total_shards]`
    pub shard: [u32; 2],

    pub properties: IdentifyProperties,

    /// Member count above which offline members are not sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdatePayload>,
}

impl IdentifyPayload {
    /// Create an identify payload for one shard
    #[must_use]
    pub fn new(token: impl Into<String>, intents: Intents, shard_id: u32, total_shards: u32) -> Self {
        Self {
            token: token.into(),
            intents: intents.bits(),
            shard: [shard_id, total_shards],
            properties: IdentifyProperties::default(),
            large_threshold: None,
            presence: None,
        }
    }

    #[must_use]
    pub fn with_large_threshold(mut self, large_threshold: u8) -> Self {
        self.large_threshold = Some(large_threshold);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Intents carried by this payload, ignoring unknown bits
    #[must_use]
    pub fn intents(&self) -> Intents {
        Intents::from_bits_truncate(self.intents)
    }
}

/// Client connection properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,
    /// Library name
    pub browser: String,
    /// Library name
    pub device: String,
}

impl IdentifyProperties {
    #[must_use]
    pub fn new(os: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            os: os.into(),
            browser: name.clone(),
            device: name,
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::new(std::env::consts::OS, env!("CARGO_PKG_NAME"))
    }
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix time in milliseconds the client went idle
    pub since: Option<u64>,

    /// Activity objects, passed through untouched
    #[serde(default)]
    pub activities: Vec<Value>,

    /// New status (online, idle, dnd, invisible, offline)
    pub status: String,

    #[serde(default)]
    pub afk: bool,
}

impl PresenceUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] =
        &["online", "idle", "dnd", "invisible", "offline"];

    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status: status.into(),
            afk: false,
        }
    }

    #[must_use]
    pub fn with_activity(mut self, activity: Value) -> Self {
        self.activities.push(activity);
        self
    }

    #[must_use]
    pub fn with_afk(mut self, since: u64) -> Self {
        self.since = Some(since);
        self.afk = true;
        self
    }

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: Option<u64>,
}

/// Body of the READY dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,

    /// Gateway URL to use when resuming this session
    #[serde(default)]
    pub resume_gateway_url: Option<String>,

    /// The current user
    pub user: User,

    /// Guilds the shard will receive, initially unavailable
    #[serde(default)]
    pub guilds: Vec<Guild>,

    #[serde(default)]
    pub shard: Option<[u32; 2]>,
}
