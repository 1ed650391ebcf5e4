//! Client facade
//!
//! [`Client`] owns the cache, the event registry, the REST dispatcher and,
//! once started, the shard manager. It is cheap to clone.

use parking_lot::{Mutex, RwLock};
use relay_cache::{CacheStats, EntityCache};
use relay_common::ClientConfig;
use relay_core::{CacheEntity, CacheKey, Channel, Guild, Member, Message, Role, Snowflake, User};
use relay_gateway::{
    Connector, EventRegistry, GatewayError, GatewayEvent, PresenceUpdatePayload, ShardManager,
    ShardState, SubscriptionHandle, TungsteniteConnector,
};
use relay_http::{GuildTemplate, HttpTransport, Invite, RequestDispatcher, ReqwestTransport, Route};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::ingest;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    cache: Arc<EntityCache>,
    events: EventRegistry,
    dispatcher: Arc<RequestDispatcher>,
    connector: Arc<dyn Connector>,
    shutdown_timeout: Duration,
    /// Serializes `start` calls
    starting: tokio::sync::Mutex<()>,
    shards: RwLock<Option<Arc<ShardManager>>>,
    presence: Mutex<Option<PresenceUpdatePayload>>,
    current_user: RwLock<Option<User>>,
}

impl Client {
    /// Client with the default transports
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.inner.dispatcher
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Check the token with `GET /users/@me`
    pub async fn login(&self) -> ClientResult<User> {
        let value: Value = self
            .inner
            .dispatcher
            .request(&Route::current_user(), None)
            .await?;
        let user = ingest::store_user(&self.inner.cache, value)?;
        tracing::info!(user_id = %user.id, username = ?user.username, "Logged in");
        *self.inner.current_user.write() = Some(user.clone());
        Ok(user)
    }

    /// The user returned by the last successful [`login`](Self::login)
    pub fn current_user(&self) -> Option<User> {
        self.inner.current_user.read().clone()
    }

    /// Connect every shard
    ///
    /// Returns once the shards are spawned; they connect in the background.
    pub async fn start(&self) -> ClientResult<()> {
        let _starting = self.inner.starting.lock().await;
        if self.inner.dispatcher.is_shut_down() {
            return Err(ClientError::Closed);
        }
        if self.inner.shards.read().is_some() {
            return Err(ClientError::AlreadyStarted);
        }

        let manager = ShardManager::connect(
            &self.inner.config,
            &self.inner.dispatcher,
            Arc::clone(&self.inner.connector),
            Arc::clone(&self.inner.cache),
            self.inner.events.clone(),
        )
        .await?;

        let presence = self.inner.presence.lock().clone();
        if let Some(presence) = presence {
            manager.update_presence(presence)?;
        }
        *self.inner.shards.write() = Some(Arc::new(manager));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.shards.read().is_some()
    }

    /// Stop every shard and cancel pending requests
    pub async fn shutdown(&self) {
        let manager = self.inner.shards.write().take();
        if let Some(manager) = manager {
            manager.shutdown(self.inner.shutdown_timeout).await;
        }
        self.inner.dispatcher.shutdown();
        tracing::info!("Client shut down");
    }

    /// Wait for the next shard that stopped on a fatal error
    ///
    /// Returns `None` when the client is not running or every shard has
    /// stopped.
    pub async fn next_fatal(&self) -> Option<(u32, GatewayError)> {
        let manager = self.inner.shards.read().clone()?;
        manager.next_fatal().await
    }

    /// State of every running shard
    pub fn shard_states(&self) -> Vec<ShardState> {
        self.inner
            .shards
            .read()
            .as_ref()
            .map(|manager| manager.states())
            .unwrap_or_default()
    }

    /// Set the bot's presence on every shard
    ///
    /// Kept across restarts and sent with the next identify when no shard is
    /// connected.
    pub fn update_presence(&self, presence: PresenceUpdatePayload) -> ClientResult<()> {
        if !presence.is_valid_status() {
            return Err(GatewayError::InvalidPresence(format!(
                "unknown status '{}'",
                presence.status
            ))
            .into());
        }
        *self.inner.presence.lock() = Some(presence.clone());
        if let Some(manager) = self.inner.shards.read().as_ref() {
            manager.update_presence(presence)?;
        }
        Ok(())
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn on<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(name, handler)
    }

    pub fn once<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.inner.events.once(name, handler)
    }

    pub fn replace<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.inner.events.replace(name, handler)
    }

    pub async fn wait_for<P>(
        &self,
        name: impl Into<String>,
        predicate: P,
        timeout: Duration,
    ) -> Option<GatewayEvent>
    where
        P: Fn(&GatewayEvent) -> bool + Send + Sync + 'static,
    {
        self.inner.events.wait_for(name, predicate, timeout).await
    }

    // =========================================================================
    // Cache reads
    // =========================================================================

    pub fn get(&self, key: CacheKey) -> Option<CacheEntity> {
        self.inner.cache.get(key)
    }

    pub fn get_guild(&self, id: Snowflake) -> Option<Guild> {
        self.inner.cache.guild(id)
    }

    pub fn get_channel(&self, id: Snowflake) -> Option<Channel> {
        self.inner.cache.channel(id)
    }

    pub fn get_role(&self, id: Snowflake) -> Option<Role> {
        self.inner.cache.role(id)
    }

    pub fn get_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.inner.cache.member(guild_id, user_id)
    }

    pub fn get_user(&self, id: Snowflake) -> Option<User> {
        self.inner.cache.user(id)
    }

    pub fn get_message(&self, id: Snowflake) -> Option<Message> {
        self.inner.cache.message(id)
    }

    /// Snapshot of every cached guild
    pub fn guilds(&self) -> Vec<Guild> {
        self.inner.cache.guilds()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.inner.cache.channels()
    }

    pub fn users(&self) -> Vec<User> {
        self.inner.cache.users()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // =========================================================================
    // REST
    // =========================================================================

    /// Fetch a user and cache it
    pub async fn fetch_user(&self, id: Snowflake) -> ClientResult<User> {
        let value: Value = self.inner.dispatcher.request(&Route::get_user(id), None).await?;
        ingest::store_user(&self.inner.cache, value)
    }

    /// Fetch a guild with its roles and cache them
    pub async fn fetch_guild(&self, id: Snowflake) -> ClientResult<Guild> {
        let value: Value = self.inner.dispatcher.request(&Route::get_guild(id), None).await?;
        ingest::store_guild(&self.inner.cache, value)
    }

    /// Fetch a channel and cache it
    ///
    /// A guild channel whose guild is not cached is returned but not stored.
    pub async fn fetch_channel(&self, id: Snowflake) -> ClientResult<Channel> {
        let channel: Channel = self
            .inner
            .dispatcher
            .request(&Route::get_channel(id), None)
            .await?;
        self.inner.cache.upsert(channel.clone().into())?;
        Ok(channel)
    }

    /// Fetch a guild member and cache it with its user
    pub async fn fetch_member(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> ClientResult<Member> {
        let route = Route::get_guild_member(guild_id, user_id);
        let value: Value = self.inner.dispatcher.request(&route, None).await?;
        ingest::store_member(&self.inner.cache, guild_id, value)
    }

    /// Fetch an invite by code, with approximate counts if asked
    ///
    /// Invites are not cached.
    pub async fn fetch_invite(&self, code: &str, with_counts: bool) -> ClientResult<Invite> {
        let route = Route::get_invite(code, with_counts);
        Ok(self.inner.dispatcher.request(&route, None).await?)
    }

    pub async fn fetch_template(&self, code: &str) -> ClientResult<GuildTemplate> {
        let route = Route::get_guild_template(code);
        Ok(self.inner.dispatcher.request(&route, None).await?)
    }

    /// Post a text message and cache the created message
    pub async fn send_message(
        &self,
        channel_id: Snowflake,
        content: impl Into<String>,
    ) -> ClientResult<Message> {
        let body = json!({ "content": content.into() });
        let value: Value = self
            .inner
            .dispatcher
            .request(&Route::create_message(channel_id), Some(body))
            .await?;
        ingest::store_message(&self.inner.cache, value)
    }

    /// Delete a message and drop it from the cache
    pub async fn delete_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> ClientResult<()> {
        self.inner
            .dispatcher
            .send(&Route::delete_message(channel_id, message_id), None)
            .await?;
        self.inner.cache.remove(CacheKey::Message(message_id));
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Builder for [`Client`]
///
/// Transports default to `reqwest` and `tokio-tungstenite`.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    connector: Option<Arc<dyn Connector>>,
    events: Option<EventRegistry>,
    shutdown_timeout: Duration,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            connector: None,
            events: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share an existing registry
    pub fn events(mut self, events: EventRegistry) -> Self {
        self.events = Some(events);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> ClientResult<Client> {
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                &self.config.http,
                &self.config.auth.token,
            )?),
        };
        let dispatcher = Arc::new(RequestDispatcher::new(transport, &self.config.http));
        let cache = Arc::new(EntityCache::new(&self.config.cache));

        Ok(Client {
            inner: Arc::new(ClientInner {
                cache,
                events: self.events.unwrap_or_default(),
                dispatcher,
                connector: self
                    .connector
                    .unwrap_or_else(|| Arc::new(TungsteniteConnector)),
                shutdown_timeout: self.shutdown_timeout,
                starting: tokio::sync::Mutex::new(()),
                shards: RwLock::new(None),
                presence: Mutex::new(None),
                current_user: RwLock::new(None),
                config: self.config,
            }),
        })
    }
}
