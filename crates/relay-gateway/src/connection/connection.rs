//! Gateway connection for one shard
//!
//! Owns the socket, the heartbeat timer and the resume [`Session`]. The run
//! loop reconnects on its own until the shard is shut down, hits a fatal close
//! code, or asks its supervisor for a fresh restart.

use relay_cache::EntityCache;
use relay_common::ClientConfig;
use relay_core::Intents;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::socket::gateway_url;
use super::{
    Backoff, ConnectionStatus, Connector, GatewaySocket, Session, ShardState, SocketEvent,
};
use crate::error::GatewayError;
use crate::events::{apply_event, EventRegistry, GatewayEvent, GatewayEventType};
use crate::protocol::{
    CloseAction, CloseCode, GatewayMessage, IdentifyPayload, OpCode, PresenceUpdatePayload,
    ReadyPayload, ResumePayload,
};
use crate::shard::IdentifyGate;

/// How long to wait for Hello after connecting
const HELLO_TIMEOUT: Duration = Duration::from_secs(20);

/// How long a close handshake may take
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Normal closure; the platform invalidates the session
const CLOSE_NORMAL: u16 = 1000;

/// Any other code keeps the session resumable
const CLOSE_RESUMABLE: u16 = 4000;

/// Settings shared by every shard
#[derive(Clone)]
pub struct ConnectionConfig {
    pub token: String,
    /// Base URL; version and encoding are appended on connect
    pub gateway_url: String,
    pub intents: Intents,
    pub large_threshold: u8,
    /// Consecutive malformed frames tolerated before a restart
    pub max_protocol_errors: u32,
    pub reconnect_floor: Duration,
    pub reconnect_cap: Duration,
}

impl ConnectionConfig {
    pub fn new(token: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gateway_url: gateway_url.into(),
            intents: Intents::default(),
            large_threshold: 50,
            max_protocol_errors: 10,
            reconnect_floor: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(60),
        }
    }

    /// Build from client configuration, connecting to `gateway_url`
    pub fn from_client_config(config: &ClientConfig, gateway_url: impl Into<String>) -> Self {
        Self {
            token: config.auth.token.clone(),
            gateway_url: gateway_url.into(),
            intents: config.gateway.intents,
            large_threshold: config.gateway.large_threshold,
            max_protocol_errors: config.gateway.max_protocol_errors,
            reconnect_floor: config.gateway.reconnect_floor(),
            reconnect_cap: config.gateway.reconnect_cap(),
        }
    }

    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("token", &"[REDACTED]")
            .field("gateway_url", &self.gateway_url)
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("max_protocol_errors", &self.max_protocol_errors)
            .field("reconnect_floor", &self.reconnect_floor)
            .field("reconnect_cap", &self.reconnect_cap)
            .finish()
    }
}

/// Collaborators shared by every shard
#[derive(Clone)]
pub struct ShardContext {
    pub config: Arc<ConnectionConfig>,
    pub connector: Arc<dyn Connector>,
    pub gate: Arc<IdentifyGate>,
    pub cache: Arc<EntityCache>,
    pub events: EventRegistry,
}

impl std::fmt::Debug for ShardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardContext")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish()
    }
}

/// Why a shard's run loop returned
#[derive(Debug)]
pub enum ShardExit {
    /// Shutdown was requested
    Shutdown,
    /// The shard should be started again with a fresh session
    Restart(String),
    /// The platform refused the shard; it must not be restarted
    Fatal(GatewayError),
}

/// How one socket lifetime ended
#[derive(Debug)]
enum SocketExit {
    Shutdown,
    /// Reconnect at once and resume
    Resume,
    /// Reconnect after backoff, resuming if the session allows
    Reconnect,
    /// Drop the session and reconnect at once
    Reidentify,
    Restart(String),
    Fatal(GatewayError),
}

impl SocketExit {
    fn close_code(&self) -> u16 {
        match self {
            Self::Resume | Self::Reconnect => CLOSE_RESUMABLE,
            Self::Shutdown | Self::Reidentify | Self::Restart(_) | Self::Fatal(_) => CLOSE_NORMAL,
        }
    }
}

type IdentifySlot = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Gateway connection of one shard
pub struct GatewayConnection {
    shard_id: u32,
    total_shards: u32,
    context: ShardContext,
    state: Arc<watch::Sender<ShardState>>,
    presence: watch::Receiver<Option<PresenceUpdatePayload>>,
    shutdown: watch::Receiver<bool>,
    session: Session,
    backoff: Backoff,
    protocol_errors: u32,
    presence_pending: bool,
}

impl GatewayConnection {
    pub fn new(
        shard_id: u32,
        total_shards: u32,
        context: ShardContext,
        state: Arc<watch::Sender<ShardState>>,
        presence: watch::Receiver<Option<PresenceUpdatePayload>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let backoff = Backoff::new(context.config.reconnect_floor, context.config.reconnect_cap);
        state.send_modify(|s| *s = ShardState::new(shard_id, total_shards));
        Self {
            shard_id,
            total_shards,
            context,
            state,
            presence,
            shutdown,
            session: Session::new(),
            backoff,
            protocol_errors: 0,
            presence_pending: false,
        }
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until shutdown, a fatal close or a restart request
    pub async fn run(mut self) -> ShardExit {
        tracing::info!(
            shard_id = self.shard_id,
            total_shards = self.total_shards,
            "Shard starting"
        );

        loop {
            if *self.shutdown.borrow() {
                self.set_status(ConnectionStatus::Disconnected);
                return ShardExit::Shutdown;
            }

            match self.connect_once().await {
                SocketExit::Shutdown => {
                    self.set_status(ConnectionStatus::Disconnected);
                    tracing::info!(shard_id = self.shard_id, "Shard shut down");
                    return ShardExit::Shutdown;
                }
                SocketExit::Fatal(error) => {
                    self.set_status(ConnectionStatus::Disconnected);
                    tracing::error!(shard_id = self.shard_id, error = %error, "Shard stopped");
                    return ShardExit::Fatal(error);
                }
                SocketExit::Restart(reason) => {
                    self.set_status(ConnectionStatus::Disconnected);
                    tracing::warn!(shard_id = self.shard_id, reason = %reason, "Shard needs a restart");
                    return ShardExit::Restart(reason);
                }
                SocketExit::Resume => {
                    tracing::info!(shard_id = self.shard_id, "Reconnecting to resume");
                }
                SocketExit::Reidentify => {
                    self.session.clear();
                    self.publish_session();
                    tracing::info!(shard_id = self.shard_id, "Session cleared, identifying again");
                }
                SocketExit::Reconnect => {
                    let delay = self.backoff.next_delay();
                    let attempts = self.backoff.attempts();
                    self.state.send_modify(|s| {
                        s.status = ConnectionStatus::Reconnecting;
                        s.reconnect_attempts = attempts;
                    });
                    tracing::info!(
                        shard_id = self.shard_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after backoff"
                    );

                    tokio::select! {
                        () = time::sleep(delay) => {}
                        () = shutdown_requested(&mut self.shutdown) => {
                            self.set_status(ConnectionStatus::Disconnected);
                            return ShardExit::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// One socket lifetime: connect, handshake, then read until it ends
    async fn connect_once(&mut self) -> SocketExit {
        let resuming = self.session.is_resumable();
        let base = match self.session.resume_url() {
            Some(url) if resuming => url.to_string(),
            _ => self.context.config.gateway_url.clone(),
        };
        let url = gateway_url(&base);
        self.protocol_errors = 0;
        self.set_status(ConnectionStatus::Connecting);
        tracing::debug!(shard_id = self.shard_id, url = %url, resuming, "Connecting to gateway");

        let connector = Arc::clone(&self.context.connector);
        let mut socket = tokio::select! {
            result = connector.connect(&url) => match result {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::warn!(shard_id = self.shard_id, error = %e, "Gateway connect failed");
                    return SocketExit::Reconnect;
                }
            },
            () = shutdown_requested(&mut self.shutdown) => return SocketExit::Shutdown,
        };

        let exit = self.drive(socket.as_mut(), resuming).await;

        let code = exit.close_code();
        match time::timeout(CLOSE_TIMEOUT, socket.close(code)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(shard_id = self.shard_id, error = %e, "Close failed"),
            Err(_) => tracing::debug!(shard_id = self.shard_id, "Close timed out"),
        }
        exit
    }

    async fn drive(&mut self, socket: &mut dyn GatewaySocket, resuming: bool) -> SocketExit {
        let interval_ms = match self.await_hello(socket).await {
            Ok(interval_ms) => interval_ms,
            Err(exit) => return exit,
        };

        let period = Duration::from_millis(interval_ms.max(1));
        // first beat is jittered so shards don't beat in lockstep
        let first = Instant::now() + period.mul_f64(rand::random::<f64>());
        let mut heartbeat = time::interval_at(first, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut acked = true;
        self.state.send_modify(|s| {
            s.heartbeat_interval_ms = interval_ms;
            s.last_heartbeat_ack = true;
        });

        let mut identify_slot: Option<IdentifySlot> = None;
        if resuming {
            self.set_status(ConnectionStatus::Resuming);
            if let Err(exit) = self.send_resume(socket).await {
                return exit;
            }
        } else {
            self.set_status(ConnectionStatus::Identifying);
            let gate = Arc::clone(&self.context.gate);
            let shard_id = self.shard_id;
            identify_slot = Some(Box::pin(async move { gate.wait(shard_id).await }));
        }

        let mut presence_open = true;
        loop {
            tokio::select! {
                () = shutdown_requested(&mut self.shutdown) => return SocketExit::Shutdown,

                () = wait_slot(&mut identify_slot) => {
                    identify_slot = None;
                    if let Err(exit) = self.send_identify(socket).await {
                        return exit;
                    }
                }

                _ = heartbeat.tick() => {
                    if !acked {
                        tracing::warn!(
                            shard_id = self.shard_id,
                            "Heartbeat not acknowledged, reconnecting"
                        );
                        return SocketExit::Reconnect;
                    }
                    acked = false;
                    self.state.send_modify(|s| s.last_heartbeat_ack = false);
                    let beat = GatewayMessage::heartbeat(self.session.sequence());
                    if let Err(exit) = self.send(socket, &beat).await {
                        return exit;
                    }
                }

                changed = self.presence.changed(), if presence_open => {
                    if changed.is_err() {
                        presence_open = false;
                        continue;
                    }
                    if let Err(exit) = self.presence_changed(socket).await {
                        return exit;
                    }
                }

                event = socket.recv() => {
                    let exit = match event {
                        None => {
                            tracing::info!(shard_id = self.shard_id, "Gateway stream ended");
                            Some(SocketExit::Reconnect)
                        }
                        Some(Err(e)) => {
                            tracing::warn!(shard_id = self.shard_id, error = %e, "Gateway read failed");
                            Some(SocketExit::Reconnect)
                        }
                        Some(Ok(SocketEvent::Closed(code))) => Some(self.on_close(code)),
                        Some(Ok(SocketEvent::Text(text))) => {
                            self.handle_text(socket, &text, &mut acked).await
                        }
                    };
                    if let Some(exit) = exit {
                        return exit;
                    }
                }
            }
        }
    }

    /// Read until Hello; returns the heartbeat interval
    async fn await_hello(&mut self, socket: &mut dyn GatewaySocket) -> Result<u64, SocketExit> {
        let deadline = time::sleep(HELLO_TIMEOUT);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = shutdown_requested(&mut self.shutdown) => return Err(SocketExit::Shutdown),
                () = &mut deadline => {
                    tracing::warn!(shard_id = self.shard_id, "No Hello received");
                    return Err(SocketExit::Reconnect);
                }
                event = socket.recv() => match event {
                    None | Some(Err(_)) => return Err(SocketExit::Reconnect),
                    Some(Ok(SocketEvent::Closed(code))) => return Err(self.on_close(code)),
                    Some(Ok(SocketEvent::Text(text))) => match GatewayMessage::from_json(&text) {
                        Ok(message) => {
                            self.protocol_errors = 0;
                            if let Some(hello) = message.as_hello() {
                                tracing::debug!(
                                    shard_id = self.shard_id,
                                    heartbeat_interval = hello.heartbeat_interval,
                                    "Received Hello"
                                );
                                return Ok(hello.heartbeat_interval);
                            }
                            tracing::debug!(shard_id = self.shard_id, op = %message.op, "Ignoring frame before Hello");
                        }
                        Err(e) => {
                            if let Some(exit) = self.protocol_error(&e.to_string()) {
                                return Err(exit);
                            }
                        }
                    },
                },
            }
        }
    }

    async fn handle_text(
        &mut self,
        socket: &mut dyn GatewaySocket,
        text: &str,
        acked: &mut bool,
    ) -> Option<SocketExit> {
        let message = match GatewayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => return self.protocol_error(&e.to_string()),
        };
        if !message.op.is_receive_op() {
            return self.protocol_error(&format!("op code {} is client-only", message.op));
        }
        self.protocol_errors = 0;

        match message.op {
            OpCode::Dispatch => return self.handle_dispatch(socket, message).await,
            OpCode::Heartbeat => {
                tracing::debug!(shard_id = self.shard_id, "Heartbeat requested");
                let beat = GatewayMessage::heartbeat(self.session.sequence());
                if let Err(exit) = self.send(socket, &beat).await {
                    return Some(exit);
                }
            }
            OpCode::HeartbeatAck => {
                *acked = true;
                self.state.send_modify(|s| s.last_heartbeat_ack = true);
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id = self.shard_id, "Gateway requested a reconnect");
                return Some(SocketExit::Resume);
            }
            OpCode::InvalidSession => {
                let resumable = message.as_invalid_session().unwrap_or(false);
                tracing::warn!(
                    shard_id = self.shard_id,
                    error = %GatewayError::SessionInvalid { resumable },
                    "Session invalidated"
                );
                return Some(if resumable && self.session.is_resumable() {
                    SocketExit::Resume
                } else {
                    SocketExit::Reidentify
                });
            }
            OpCode::Hello => {
                tracing::debug!(shard_id = self.shard_id, "Ignoring repeated Hello");
            }
            op => tracing::debug!(shard_id = self.shard_id, op = %op, "Ignoring op code"),
        }
        None
    }

    async fn handle_dispatch(
        &mut self,
        socket: &mut dyn GatewaySocket,
        message: GatewayMessage,
    ) -> Option<SocketExit> {
        let Some(name) = message.t else {
            return self.protocol_error("dispatch without event name");
        };
        let sequence = message.s;
        let data = message.d.unwrap_or(Value::Null);

        if let Some(sequence) = sequence {
            self.session.record(sequence);
        }

        match GatewayEventType::from_str(&name) {
            Some(GatewayEventType::Ready) => {
                let ready = match ReadyPayload::deserialize(&data) {
                    Ok(ready) => ready,
                    Err(e) => return self.protocol_error(&format!("READY: {e}")),
                };
                let purged = self
                    .context
                    .cache
                    .purge_shard(self.shard_id, self.total_shards);
                tracing::info!(
                    shard_id = self.shard_id,
                    session_id = %ready.session_id,
                    guilds = ready.guilds.len(),
                    purged,
                    "Shard ready"
                );
                self.session
                    .start(ready.session_id, ready.resume_gateway_url, sequence);
                self.backoff.reset();
                self.presence_pending = false;
                self.set_status(ConnectionStatus::Ready);
            }
            Some(GatewayEventType::Resumed) => {
                tracing::info!(
                    shard_id = self.shard_id,
                    sequence = ?self.session.sequence(),
                    "Session resumed"
                );
                self.backoff.reset();
                self.set_status(ConnectionStatus::Ready);
                if self.presence_pending {
                    if let Err(exit) = self.send_presence(socket).await {
                        return Some(exit);
                    }
                }
            }
            _ => {}
        }
        self.publish_session();

        let event = GatewayEvent::new(self.shard_id, name, sequence, data);
        apply_event(&self.context.cache, &event);
        self.context.events.emit(&event);
        None
    }

    fn on_close(&self, code: Option<u16>) -> SocketExit {
        match CloseCode::action_for(code) {
            CloseAction::Resume => {
                tracing::info!(shard_id = self.shard_id, code = ?code, "Gateway closed the connection");
                SocketExit::Reconnect
            }
            CloseAction::Reidentify => {
                tracing::warn!(shard_id = self.shard_id, code = ?code, "Gateway closed, session not resumable");
                SocketExit::Reidentify
            }
            CloseAction::Fatal => {
                let code = code.unwrap_or_default();
                let reason = CloseCode::from_u16(code)
                    .map_or("unknown", CloseCode::description)
                    .to_string();
                SocketExit::Fatal(GatewayError::Fatal { code, reason })
            }
        }
    }

    fn protocol_error(&mut self, error: &str) -> Option<SocketExit> {
        self.protocol_errors += 1;
        tracing::warn!(
            shard_id = self.shard_id,
            error = %GatewayError::Protocol(error.to_string()),
            consecutive = self.protocol_errors,
            "Dropped malformed gateway frame"
        );
        (self.protocol_errors > self.context.config.max_protocol_errors).then(|| {
            SocketExit::Restart(format!(
                "{} consecutive malformed frames",
                self.protocol_errors
            ))
        })
    }

    async fn send_identify(&mut self, socket: &mut dyn GatewaySocket) -> Result<(), SocketExit> {
        let config = &self.context.config;
        let mut payload = IdentifyPayload::new(
            config.token.clone(),
            config.intents,
            self.shard_id,
            self.total_shards,
        )
        .with_large_threshold(config.large_threshold);

        let presence = self.presence.borrow_and_update().clone();
        if let Some(presence) = presence {
            payload = payload.with_presence(presence);
        }
        self.presence_pending = false;

        tracing::info!(shard_id = self.shard_id, "Identifying");
        self.send(socket, &GatewayMessage::identify(&payload)).await
    }

    async fn send_resume(&self, socket: &mut dyn GatewaySocket) -> Result<(), SocketExit> {
        let payload = ResumePayload {
            token: self.context.config.token.clone(),
            session_id: self.session.session_id().unwrap_or_default().to_string(),
            seq: self.session.sequence(),
        };
        tracing::info!(
            shard_id = self.shard_id,
            session_id = %payload.session_id,
            sequence = ?payload.seq,
            "Resuming session"
        );
        self.send(socket, &GatewayMessage::resume(&payload)).await
    }

    async fn presence_changed(&mut self, socket: &mut dyn GatewaySocket) -> Result<(), SocketExit> {
        if self.state.borrow().is_ready() {
            self.send_presence(socket).await
        } else {
            // sent with the next identify, or after RESUMED
            self.presence_pending = true;
            Ok(())
        }
    }

    async fn send_presence(&mut self, socket: &mut dyn GatewaySocket) -> Result<(), SocketExit> {
        self.presence_pending = false;
        let presence = self.presence.borrow_and_update().clone();
        match presence {
            Some(presence) => {
                tracing::debug!(shard_id = self.shard_id, status = %presence.status, "Updating presence");
                self.send(socket, &GatewayMessage::presence_update(&presence))
                    .await
            }
            None => Ok(()),
        }
    }

    async fn send(
        &self,
        socket: &mut dyn GatewaySocket,
        message: &GatewayMessage,
    ) -> Result<(), SocketExit> {
        let text = message
            .to_json()
            .map_err(|e| SocketExit::Restart(format!("frame encoding failed: {e}")))?;
        tracing::trace!(shard_id = self.shard_id, op = %message.op, "Sending frame");
        socket.send(text).await.map_err(|e| {
            tracing::warn!(shard_id = self.shard_id, error = %e, "Gateway send failed");
            SocketExit::Reconnect
        })
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.state.borrow().status;
        if previous != status {
            tracing::debug!(shard_id = self.shard_id, from = %previous, to = %status, "Shard status");
        }
        self.state.send_modify(|s| s.status = status);
    }

    fn publish_session(&self) {
        let sequence = self.session.sequence();
        let session_id = self.session.session_id().map(str::to_owned);
        self.state.send_modify(|s| {
            s.sequence = sequence;
            s.session_id = session_id;
        });
    }
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("shard_id", &self.shard_id)
            .field("total_shards", &self.total_shards)
            .field("session", &self.session)
            .finish()
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn wait_slot(slot: &mut Option<IdentifySlot>) {
    match slot {
        Some(slot) => slot.await,
        None => std::future::pending().await,
    }
}
