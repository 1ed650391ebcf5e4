//! Gateway socket transport
//!
//! The shard talks to the gateway through [`GatewaySocket`]; [`Connector`]
//! opens one per connection attempt. The production implementation is
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::GatewayError;

/// Gateway API version requested on connect
pub const API_VERSION: u8 = 10;

/// Something received from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame
    Text(String),
    /// The peer closed the connection, with its close code if it sent one
    Closed(Option<u16>),
}

/// An open gateway connection
#[async_trait]
pub trait GatewaySocket: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), GatewayError>;

    /// Receive the next event; `None` once the stream has ended
    ///
    /// Must be cancel safe.
    async fn recv(&mut self) -> Option<Result<SocketEvent, GatewayError>>;

    /// Close with `code`
    async fn close(&mut self, code: u16) -> Result<(), GatewayError>;
}

/// Opens gateway sockets
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewaySocket>, GatewayError>;
}

/// Append the version and encoding query to a gateway base URL
pub fn gateway_url(base: &str) -> String {
    if base.contains('?') {
        return base.to_string();
    }
    format!(
        "{}/?v={API_VERSION}&encoding=json",
        base.trim_end_matches('/')
    )
}

/// `tokio-tungstenite` connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewaySocket>, GatewayError> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!(url = %url, status = %response.status(), "Gateway socket opened");
        Ok(Box::new(TungsteniteSocket { stream }))
    }
}

struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewaySocket for TungsteniteSocket {
    async fn send(&mut self, text: String) -> Result<(), GatewayError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<SocketEvent, GatewayError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };

            return Some(match message {
                Message::Text(text) => Ok(SocketEvent::Text(text)),
                Message::Binary(bytes) => String::from_utf8(bytes)
                    .map(SocketEvent::Text)
                    .map_err(|e| GatewayError::Protocol(format!("binary frame: {e}"))),
                Message::Close(frame) => Ok(SocketEvent::Closed(frame.map(|f| u16::from(f.code)))),
                // pongs are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            });
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
