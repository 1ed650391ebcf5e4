//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use relay_core::Intents;
use serde::Deserialize;

/// Main client configuration
#[derive(Clone)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: default_env(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Bot credentials
#[derive(Clone)]
pub struct AuthConfig {
    pub token: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app", &self.app)
            .field("auth", &self.auth)
            .field("gateway", &self.gateway)
            .field("http", &self.http)
            .field("cache", &self.cache)
            .finish()
    }
}

/// How many shards to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardCount {
    /// Use the platform's recommendation from `GET /gateway/bot`
    #[default]
    Auto,
    Fixed(u32),
}

impl FromStr for ShardCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match s.parse::<u32>() {
            Ok(0) => Err("shard count must be at least 1".to_string()),
            Ok(n) => Ok(Self::Fixed(n)),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Used when the shard count is fixed; `auto` takes the URL from `GET /gateway/bot`
    pub url: String,
    pub intents: Intents,
    pub shard_count: ShardCount,
    /// Minimum spacing between identifies in one concurrency bucket
    pub identify_interval_ms: u64,
    pub large_threshold: u8,
    pub reconnect_floor_ms: u64,
    pub reconnect_cap_ms: u64,
    /// Consecutive malformed frames tolerated before the shard is restarted
    pub max_protocol_errors: u32,
}

impl GatewayConfig {
    pub fn identify_interval(&self) -> Duration {
        Duration::from_millis(self.identify_interval_ms)
    }

    pub fn reconnect_floor(&self) -> Duration {
        Duration::from_millis(self.reconnect_floor_ms)
    }

    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            intents: Intents::default(),
            shard_count: ShardCount::Auto,
            identify_interval_ms: default_identify_interval_ms(),
            large_threshold: default_large_threshold(),
            reconnect_floor_ms: default_reconnect_floor_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            max_protocol_errors: default_max_protocol_errors(),
        }
    }
}

/// REST client settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub max_rate_limit_retries: u32,
    pub max_server_retries: u32,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_http_timeout_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_server_retries: default_max_server_retries(),
        }
    }
}

/// Entity cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub message_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            message_capacity: default_message_capacity(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "relay-bot".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_identify_interval_ms() -> u64 {
    5_000
}

fn default_large_threshold() -> u8 {
    50
}

fn default_reconnect_floor_ms() -> u64 {
    1_000
}

fn default_reconnect_cap_ms() -> u64 {
    60_000
}

fn default_max_protocol_errors() -> u32 {
    10
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

fn default_max_server_retries() -> u32 {
    3
}

fn default_message_capacity() -> usize {
    1_000
}

impl ClientConfig {
    /// Configuration with every setting at its default
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            app: AppSettings::default(),
            auth: AuthConfig {
                token: token.into(),
            },
            gateway: GatewayConfig::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `BOT_TOKEN` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let env = match vars.get("APP_ENV") {
            Some(raw) => Environment::parse(&raw)
                .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            None => default_env(),
        };

        Ok(Self {
            app: AppSettings {
                name: vars.get("APP_NAME").unwrap_or_else(default_app_name),
                env,
            },
            auth: AuthConfig {
                token: vars
                    .get("BOT_TOKEN")
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(ConfigError::MissingVar("BOT_TOKEN"))?,
            },
            gateway: GatewayConfig {
                url: vars.get("GATEWAY_URL").unwrap_or_else(default_gateway_url),
                intents: vars
                    .parse::<u64>("GATEWAY_INTENTS")?
                    .map_or_else(Intents::default, Intents::from_bits_truncate),
                shard_count: vars.parse("SHARD_COUNT")?.unwrap_or_default(),
                identify_interval_ms: vars
                    .parse("IDENTIFY_INTERVAL_MS")?
                    .unwrap_or_else(default_identify_interval_ms),
                large_threshold: vars
                    .parse("GATEWAY_LARGE_THRESHOLD")?
                    .unwrap_or_else(default_large_threshold),
                reconnect_floor_ms: vars
                    .parse("RECONNECT_FLOOR_MS")?
                    .unwrap_or_else(default_reconnect_floor_ms),
                reconnect_cap_ms: vars
                    .parse("RECONNECT_CAP_MS")?
                    .unwrap_or_else(default_reconnect_cap_ms),
                max_protocol_errors: vars
                    .parse("MAX_PROTOCOL_ERRORS")?
                    .unwrap_or_else(default_max_protocol_errors),
            },
            http: HttpConfig {
                api_base_url: vars
                    .get("API_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(default_api_base_url),
                timeout_secs: vars
                    .parse("HTTP_TIMEOUT_SECS")?
                    .unwrap_or_else(default_http_timeout_secs),
                max_rate_limit_retries: vars
                    .parse("HTTP_MAX_RATE_LIMIT_RETRIES")?
                    .unwrap_or_else(default_max_rate_limit_retries),
                max_server_retries: vars
                    .parse("HTTP_MAX_SERVER_RETRIES")?
                    .unwrap_or_else(default_max_server_retries),
            },
            cache: CacheConfig {
                message_capacity: vars
                    .parse("MESSAGE_CACHE_SIZE")?
                    .unwrap_or_else(default_message_capacity),
            },
        })
    }
}

/// Variable lookup with typed parsing
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue(key, format!("{raw:?} ({e})"))),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
