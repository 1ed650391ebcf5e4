//! Shard supervision
//!
//! The manager resolves how many shards to run, starts one supervisor task per
//! shard and restarts shards that ask for it. Shards share the identify gate,
//! the entity cache and the event registry, nothing else.

use futures_util::FutureExt;
use relay_cache::EntityCache;
use relay_common::{ClientConfig, GatewayConfig, ShardCount};
use relay_http::RequestDispatcher;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::IdentifyGate;
use crate::connection::{
    Backoff, ConnectionConfig, ConnectionStatus, Connector, GatewayConnection, ShardContext,
    ShardExit, ShardState,
};
use crate::error::GatewayError;
use crate::events::EventRegistry;
use crate::protocol::PresenceUpdatePayload;

/// Where to connect and how many shards to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    pub gateway_url: String,
    pub shard_count: u32,
    pub max_concurrency: u32,
}

impl ShardPlan {
    pub fn new(
        gateway_url: impl Into<String>,
        shard_count: u32,
        max_concurrency: u32,
    ) -> Result<Self, GatewayError> {
        if shard_count == 0 {
            return Err(GatewayError::InvalidShards(
                "shard count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            gateway_url: gateway_url.into(),
            shard_count,
            max_concurrency: max_concurrency.max(1),
        })
    }

    /// Use the configured shard count, or ask `GET /gateway/bot` for it
    pub async fn resolve(
        config: &GatewayConfig,
        dispatcher: &RequestDispatcher,
    ) -> Result<Self, GatewayError> {
        match config.shard_count {
            ShardCount::Fixed(count) => Self::new(config.url.clone(), count, 1),
            ShardCount::Auto => {
                let info = dispatcher.gateway_bot().await?;
                let limit = info.session_start_limit;
                tracing::info!(
                    shards = info.shards,
                    max_concurrency = limit.max_concurrency,
                    remaining = limit.remaining,
                    "Fetched gateway bot info"
                );
                if limit.remaining < info.shards {
                    tracing::warn!(
                        remaining = limit.remaining,
                        reset_after_ms = limit.reset_after,
                        "Session start budget lower than shard count"
                    );
                }
                Self::new(info.url, info.shards, limit.max_concurrency)
            }
        }
    }
}

struct Shard {
    state: Arc<watch::Sender<ShardState>>,
}

/// Runs and supervises every shard
pub struct ShardManager {
    plan: ShardPlan,
    shards: Vec<Shard>,
    presence: watch::Sender<Option<PresenceUpdatePayload>>,
    shutdown: watch::Sender<bool>,
    fatal: Mutex<mpsc::UnboundedReceiver<(u32, GatewayError)>>,
    supervisors: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ShardManager {
    /// Resolve the shard plan and start every shard
    pub async fn connect(
        config: &ClientConfig,
        dispatcher: &RequestDispatcher,
        connector: Arc<dyn Connector>,
        cache: Arc<EntityCache>,
        events: EventRegistry,
    ) -> Result<Self, GatewayError> {
        let plan = ShardPlan::resolve(&config.gateway, dispatcher).await?;
        let context = ShardContext {
            config: Arc::new(ConnectionConfig::from_client_config(
                config,
                plan.gateway_url.clone(),
            )),
            connector,
            gate: Arc::new(IdentifyGate::new(
                plan.max_concurrency,
                config.gateway.identify_interval(),
            )),
            cache,
            events,
        };
        Ok(Self::start(plan, context))
    }

    /// Start every shard of `plan`
    ///
    /// Must be called within a tokio runtime.
    pub fn start(plan: ShardPlan, context: ShardContext) -> Self {
        let (presence, _) = watch::channel(None);
        let (shutdown, _) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        tracing::info!(
            shards = plan.shard_count,
            max_concurrency = plan.max_concurrency,
            gateway_url = %plan.gateway_url,
            "Starting shards"
        );

        let mut shards = Vec::with_capacity(plan.shard_count as usize);
        let mut supervisors = Vec::with_capacity(plan.shard_count as usize);
        for shard_id in 0..plan.shard_count {
            let state = Arc::new(watch::Sender::new(ShardState::new(
                shard_id,
                plan.shard_count,
            )));
            let supervisor = Supervisor {
                shard_id,
                total_shards: plan.shard_count,
                context: context.clone(),
                state: Arc::clone(&state),
                presence: presence.subscribe(),
                shutdown: shutdown.subscribe(),
                fatal: fatal_tx.clone(),
            };
            supervisors.push(tokio::spawn(supervisor.run()));
            shards.push(Shard { state });
        }

        Self {
            plan,
            shards,
            presence,
            shutdown,
            fatal: Mutex::new(fatal_rx),
            supervisors: parking_lot::Mutex::new(supervisors),
        }
    }

    pub fn plan(&self) -> &ShardPlan {
        &self.plan
    }

    pub fn shard_count(&self) -> u32 {
        self.plan.shard_count
    }

    /// Current state of one shard
    pub fn state(&self, shard_id: u32) -> Option<ShardState> {
        self.shards
            .get(shard_id as usize)
            .map(|shard| shard.state.borrow().clone())
    }

    /// Current state of every shard
    pub fn states(&self) -> Vec<ShardState> {
        self.shards
            .iter()
            .map(|shard| shard.state.borrow().clone())
            .collect()
    }

    /// Watch one shard's state
    pub fn subscribe_state(&self, shard_id: u32) -> Option<watch::Receiver<ShardState>> {
        self.shards
            .get(shard_id as usize)
            .map(|shard| shard.state.subscribe())
    }

    pub fn all_ready(&self) -> bool {
        self.shards.iter().all(|shard| shard.state.borrow().is_ready())
    }

    /// Set the presence of every shard
    ///
    /// Ready shards send it at once, the others when they next identify or
    /// resume.
    pub fn update_presence(&self, presence: PresenceUpdatePayload) -> Result<(), GatewayError> {
        if !presence.is_valid_status() {
            return Err(GatewayError::InvalidPresence(format!(
                "unknown status '{}'",
                presence.status
            )));
        }
        self.presence.send_replace(Some(presence));
        Ok(())
    }

    /// Wait for the next shard that stopped on a fatal error
    ///
    /// Returns `None` once every shard has stopped.
    pub async fn next_fatal(&self) -> Option<(u32, GatewayError)> {
        self.fatal.lock().await.recv().await
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop every shard
    ///
    /// Shards get until `timeout` to close their sockets; the rest are
    /// aborted.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.send_replace(true);
        let supervisors = std::mem::take(&mut *self.supervisors.lock());
        let deadline = Instant::now() + timeout;
        let mut aborted = 0usize;

        for mut supervisor in supervisors {
            if time::timeout_at(deadline, &mut supervisor).await.is_err() {
                supervisor.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            tracing::warn!(aborted, "Shards did not stop in time");
        }
        tracing::info!(shards = self.plan.shard_count, "Shards stopped");
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("plan", &self.plan)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for ShardManager {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Keeps one shard running
struct Supervisor {
    shard_id: u32,
    total_shards: u32,
    context: ShardContext,
    state: Arc<watch::Sender<ShardState>>,
    presence: watch::Receiver<Option<PresenceUpdatePayload>>,
    shutdown: watch::Receiver<bool>,
    fatal: mpsc::UnboundedSender<(u32, GatewayError)>,
}

impl Supervisor {
    async fn run(self) {
        let config = &self.context.config;
        let mut backoff = Backoff::new(config.reconnect_floor, config.reconnect_cap);
        let mut shutdown = self.shutdown.clone();
        let mut restarts = 0u32;

        loop {
            let connection = GatewayConnection::new(
                self.shard_id,
                self.total_shards,
                self.context.clone(),
                Arc::clone(&self.state),
                self.presence.clone(),
                self.shutdown.clone(),
            );

            // the new connection starts from a blank state, so Ready means it got there
            let mut ready = self.state.subscribe();
            let mut watching = true;
            let run = AssertUnwindSafe(connection.run()).catch_unwind();
            tokio::pin!(run);
            let exit = loop {
                tokio::select! {
                    biased;
                    seen = ready.wait_for(ShardState::is_ready), if watching => {
                        watching = false;
                        if seen.is_ok() {
                            backoff.reset();
                        }
                    }
                    result = &mut run => break match result {
                        Ok(exit) => exit,
                        Err(_) => ShardExit::Restart("shard task panicked".to_string()),
                    },
                }
            };

            match exit {
                ShardExit::Shutdown => return,
                ShardExit::Fatal(error) => {
                    let _ = self.fatal.send((self.shard_id, error));
                    return;
                }
                ShardExit::Restart(reason) => {
                    if *shutdown.borrow() {
                        return;
                    }
                    restarts += 1;
                    let delay = backoff.next_delay();
                    let attempts = backoff.attempts();
                    self.state.send_modify(|s| {
                        s.status = ConnectionStatus::Reconnecting;
                        s.reconnect_attempts = attempts;
                    });
                    tracing::warn!(
                        shard_id = self.shard_id,
                        restarts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Restarting shard"
                    );

                    tokio::select! {
                        () = time::sleep(delay) => {}
                        _ = shutdown.wait_for(|stopped| *stopped) => {
                            self.state.send_modify(|s| s.status = ConnectionStatus::Disconnected);
                            return;
                        }
                    }
                }
            }
        }
    }
}
