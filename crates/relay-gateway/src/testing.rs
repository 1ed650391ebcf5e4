//! In-memory gateway sockets for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connection::{Connector, GatewaySocket, SocketEvent};
use crate::error::GatewayError;
use crate::protocol::GatewayMessage;

/// A frame the client wrote
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Text(String),
    Close(u16),
}

impl ClientFrame {
    pub fn message(&self) -> GatewayMessage {
        match self {
            Self::Text(text) => GatewayMessage::from_json(text).unwrap(),
            Self::Close(code) => panic!("expected a text frame, got close {code}"),
        }
    }
}

/// Server side of one mock connection
pub struct MockServer {
    pub url: String,
    inbound: mpsc::UnboundedSender<SocketEvent>,
    outbound: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MockServer {
    pub fn send(&self, message: &GatewayMessage) {
        self.send_raw(&message.to_json().unwrap());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.inbound.send(SocketEvent::Text(text.to_string()));
    }

    pub fn hello(&self, interval_ms: u64) {
        self.send(&GatewayMessage::hello(interval_ms));
    }

    pub fn dispatch(&self, name: &str, sequence: u64, data: Value) {
        self.send(&GatewayMessage::dispatch(name, sequence, data));
    }

    pub fn close(&self, code: u16) {
        let _ = self.inbound.send(SocketEvent::Closed(Some(code)));
    }

    /// Next frame the client wrote; `None` once the client dropped the socket
    pub async fn next(&mut self) -> Option<ClientFrame> {
        self.outbound.recv().await
    }

    /// Next text frame parsed as a gateway message
    pub async fn next_message(&mut self) -> GatewayMessage {
        self.next().await.expect("client hung up").message()
    }

    /// Skip heartbeats until a frame with another op code arrives
    pub async fn next_non_heartbeat(&mut self) -> ClientFrame {
        loop {
            let frame = self.next().await.expect("client hung up");
            if let ClientFrame::Text(text) = &frame {
                if GatewayMessage::from_json(text).unwrap().op == crate::protocol::OpCode::Heartbeat {
                    continue;
                }
            }
            return frame;
        }
    }

    /// Drain frames already written
    pub fn drain(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

struct MockSocket {
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

#[async_trait]
impl GatewaySocket for MockSocket {
    async fn send(&mut self, text: String) -> Result<(), GatewayError> {
        self.outbound
            .send(ClientFrame::Text(text))
            .map_err(|_| GatewayError::Transport("mock server gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<SocketEvent, GatewayError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        let _ = self.outbound.send(ClientFrame::Close(code));
        Ok(())
    }
}

/// Connector handing each new connection's server side to the test
pub struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    refuse: Mutex<u32>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                servers: tx,
                refuse: Mutex::new(0),
            },
            rx,
        )
    }

    /// Fail the next `n` connection attempts
    pub fn refuse_next(&self, n: u32) {
        *self.refuse.lock() = n;
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewaySocket>, GatewayError> {
        {
            let mut refuse = self.refuse.lock();
            if *refuse > 0 {
                *refuse -= 1;
                return Err(GatewayError::Transport("connection refused".into()));
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let server = MockServer {
            url: url.to_string(),
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        self.servers
            .send(server)
            .map_err(|_| GatewayError::Transport("test finished".into()))?;

        Ok(Box::new(MockSocket {
            inbound: inbound_rx,
            outbound: outbound_tx,
        }))
    }
}
