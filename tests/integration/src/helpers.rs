//! Fake gateway and REST servers
//!
//! Both bind to an ephemeral local port and run until dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use relay_gateway::protocol::{GatewayMessage, OpCode};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response as WsResponse};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::fixtures::{bot_user, TOKEN};

/// How long helpers wait for the client before failing the test
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Gateway
// ============================================================================

/// Local WebSocket server handing every accepted connection to the test
pub struct FakeGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<GatewayPeer>,
    handle: JoinHandle<()>,
}

impl FakeGateway {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match GatewayPeer::accept(stream).await {
                    Ok(peer) => {
                        if tx.send(peer).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("gateway handshake failed: {e}"),
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the client's next connection
    pub async fn accept(&mut self) -> Result<GatewayPeer> {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .context("no connection attempt")?
            .ok_or_else(|| anyhow!("gateway listener stopped"))
    }

    /// Check that no further connection is pending
    pub fn no_pending_connection(&mut self) -> bool {
        self.connections.try_recv().is_err()
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Server side of one gateway connection
pub struct GatewayPeer {
    /// Request URI the client connected with
    pub uri: String,
    ws: WebSocketStream<TcpStream>,
}

impl GatewayPeer {
    async fn accept(stream: TcpStream) -> Result<Self> {
        let mut uri = String::new();
        let ws = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: WsResponse| {
            uri = request.uri().to_string();
            Ok(response)
        })
        .await?;
        Ok(Self { uri, ws })
    }

    pub async fn send(&mut self, message: &GatewayMessage) -> Result<()> {
        self.ws.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    pub async fn hello(&mut self, heartbeat_interval_ms: u64) -> Result<()> {
        self.send(&GatewayMessage::hello(heartbeat_interval_ms)).await
    }

    pub async fn dispatch(&mut self, name: &str, sequence: u64, data: Value) -> Result<()> {
        self.send(&GatewayMessage::dispatch(name, sequence, data)).await
    }

    /// Next frame from the client
    pub async fn recv(&mut self) -> Result<GatewayMessage> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("client sent nothing")?
                .ok_or_else(|| anyhow!("client hung up"))??;
            match frame {
                Message::Text(text) => return Ok(GatewayMessage::from_json(&text)?),
                Message::Close(frame) => bail!("client closed: {frame:?}"),
                _ => {}
            }
        }
    }

    /// Next frame with `op`, acknowledging heartbeats on the way
    pub async fn expect(&mut self, op: OpCode) -> Result<GatewayMessage> {
        loop {
            let message = self.recv().await?;
            if message.op == op {
                return Ok(message);
            }
            if message.op == OpCode::Heartbeat {
                self.send(&GatewayMessage::heartbeat_ack()).await?;
                continue;
            }
            bail!("expected {op}, got {}", message.op);
        }
    }

    /// Close the connection with `code`
    pub async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.ws.close(Some(frame)).await?;
        Ok(())
    }

    /// Wait for the client to close; returns its close code
    pub async fn closed(&mut self) -> Result<Option<u16>> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("client did not close")?;
            match frame {
                None => return Ok(None),
                Some(Ok(Message::Close(frame))) => return Ok(frame.map(|f| u16::from(f.code))),
                Some(Ok(_)) => {}
                Some(Err(_)) => return Ok(None),
            }
        }
    }
}

// ============================================================================
// REST
// ============================================================================

/// Counters and settings shared with the REST handlers
pub struct RestState {
    pub gateway_url: String,
    pub shards: u32,
    pub next_message_id: AtomicU64,
    pub rate_limited_calls: AtomicU32,
    pub failing_calls: AtomicU32,
}

/// Local REST server
///
/// Routes:
/// - `GET /gateway/bot`
/// - `GET /users/@me`, 401 unless the bot token is sent
/// - `POST /channels/{id}/messages`, one request per 200 ms per channel
/// - `GET /flaky/rate-limited`, 429 on the first call
/// - `GET /flaky/server-error`, 500 on the first call
/// - `GET /slow-bucket`, exhausts its bucket for 30 s
pub struct FakeRest {
    pub addr: SocketAddr,
    pub state: Arc<RestState>,
    handle: JoinHandle<()>,
}

impl FakeRest {
    pub async fn start(gateway_url: impl Into<String>, shards: u32) -> Result<Self> {
        let state = Arc::new(RestState {
            gateway_url: gateway_url.into(),
            shards,
            next_message_id: AtomicU64::new(1000),
            rate_limited_calls: AtomicU32::new(0),
            failing_calls: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/gateway/bot", get(gateway_bot))
            .route("/users/@me", get(current_user))
            .route("/channels/:channel_id/messages", post(create_message))
            .route("/flaky/rate-limited", get(rate_limited))
            .route("/flaky/server-error", get(server_error))
            .route("/slow-bucket", get(slow_bucket))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for FakeRest {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bot {TOKEN}"))
}

async fn gateway_bot(State(state): State<Arc<RestState>>) -> Json<Value> {
    Json(json!({
        "url": state.gateway_url,
        "shards": state.shards,
        "session_start_limit": {
            "total": 1000,
            "remaining": 999,
            "reset_after": 3_600_000,
            "max_concurrency": 1
        }
    }))
}

async fn current_user(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "401: Unauthorized", "code": 0})),
        )
            .into_response();
    }
    Json(bot_user()).into_response()
}

async fn create_message(
    State(state): State<Arc<RestState>>,
    Path(channel_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let id = state.next_message_id.fetch_add(1, Ordering::SeqCst);
    let message = json!({
        "id": id.to_string(),
        "channel_id": channel_id,
        "content": body["content"],
        "author": bot_user(),
        "timestamp": "2024-01-01T00:00:00+00:00"
    });
    (
        [
            ("x-ratelimit-limit", "1"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "0.2"),
            ("x-ratelimit-bucket", "messages"),
        ],
        Json(message),
    )
        .into_response()
}

async fn rate_limited(State(state): State<Arc<RestState>>) -> Response {
    if state.rate_limited_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("retry-after", "1")],
            Json(json!({
                "message": "You are being rate limited.",
                "retry_after": 0.1,
                "global": false
            })),
        )
            .into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn server_error(State(state): State<Arc<RestState>>) -> Response {
    if state.failing_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn slow_bucket() -> Response {
    (
        [
            ("x-ratelimit-limit", "1"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "30"),
        ],
        Json(json!({"ok": true})),
    )
        .into_response()
}
