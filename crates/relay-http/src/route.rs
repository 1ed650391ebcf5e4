//! Routes - method, path template and rate-limit bucket key

use std::fmt;

use relay_core::Snowflake;

pub use reqwest::Method;

/// Parameters that split a route into separate rate-limit buckets
const MAJOR_PARAMS: [&str; 3] = ["channel_id", "guild_id", "webhook_id"];

/// A REST route with its parameters filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: &'static str,
    path: String,
    major: Option<String>,
}

impl Route {
    /// Create a route from a template such as `/channels/{channel_id}/messages`
    pub fn new(method: Method, template: &'static str) -> Self {
        Self {
            method,
            template,
            path: template.to_string(),
            major: None,
        }
    }

    /// Fill in a `{name}` placeholder
    ///
    /// The first major parameter filled becomes the bucket's major value.
    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        self.path = self.path.replace(&format!("{{{name}}}"), &value);
        if self.major.is_none() && MAJOR_PARAMS.contains(&name) {
            self.major = Some(value);
        }
        self
    }

    /// Append a query parameter to the path
    ///
    /// The bucket key is unaffected.
    pub fn query(mut self, name: &str, value: impl fmt::Display) -> Self {
        let separator = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!("{}{separator}{name}={value}", self.path);
        self
    }

    /// Override the major parameter
    pub fn with_major(mut self, major: impl fmt::Display) -> Self {
        self.major = Some(major.to_string());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn major(&self) -> Option<&str> {
        self.major.as_deref()
    }

    /// `"{METHOD} {template}:{major}"`
    pub fn bucket_key(&self) -> String {
        format!(
            "{} {}:{}",
            self.method,
            self.template,
            self.major.as_deref().unwrap_or_default()
        )
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    pub fn gateway_bot() -> Self {
        Self::new(Method::GET, "/gateway/bot")
    }

    pub fn current_user() -> Self {
        Self::new(Method::GET, "/users/@me")
    }

    pub fn get_user(user_id: Snowflake) -> Self {
        Self::new(Method::GET, "/users/{user_id}").param("user_id", user_id)
    }

    pub fn get_guild(guild_id: Snowflake) -> Self {
        Self::new(Method::GET, "/guilds/{guild_id}").param("guild_id", guild_id)
    }

    pub fn get_guild_member(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self::new(Method::GET, "/guilds/{guild_id}/members/{user_id}")
            .param("guild_id", guild_id)
            .param("user_id", user_id)
    }

    pub fn get_channel(channel_id: Snowflake) -> Self {
        Self::new(Method::GET, "/channels/{channel_id}").param("channel_id", channel_id)
    }

    pub fn create_message(channel_id: Snowflake) -> Self {
        Self::new(Method::POST, "/channels/{channel_id}/messages").param("channel_id", channel_id)
    }

    pub fn delete_message(channel_id: Snowflake, message_id: Snowflake) -> Self {
        Self::new(Method::DELETE, "/channels/{channel_id}/messages/{message_id}")
            .param("channel_id", channel_id)
            .param("message_id", message_id)
    }

    pub fn get_invite(code: &str, with_counts: bool) -> Self {
        Self::new(Method::GET, "/invites/{invite_code}")
            .param("invite_code", code)
            .query("with_counts", with_counts)
    }

    pub fn get_guild_template(code: &str) -> Self {
        Self::new(Method::GET, "/guilds/templates/{template_code}").param("template_code", code)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
