//! Connection seam between the session state machine and the network.
//!
//! [`SessionManager`](crate::manager::SessionManager) only sees text frames
//! through [`Transport`], so its failure transitions can be driven by an
//! in-memory fake in tests. [`WsConnector`] is the real implementation over
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One live connection. Dropped and recreated on every reconnect.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Wait for the next text frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. Must be
    /// cancel-safe: dropping the future loses no frame.
    async fn recv_text(&mut self) -> Result<Option<String>, SessionError>;

    /// Close the connection with a close frame.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new connection to `url`.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, SessionError>;
}

/// Connects with `tokio-tungstenite`.
#[derive(Clone, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, SessionError> {
        debug!(%url, "opening websocket");
        let (ws, response) = connect_async(url.as_str()).await?;
        debug!(status = %response.status(), "websocket upgraded");
        Ok(Box::new(WsTransport { ws }))
    }
}

/// A `tokio-tungstenite` client stream.
pub struct WsTransport {
    ws: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>, SessionError> {
        loop {
            match self.ws.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server sent close frame");
                    return Ok(None);
                }
                // Pings are answered by tungstenite on the next read/write.
                Some(Ok(other)) => trace!(len = other.len(), "ignoring non-text frame"),
                Some(Err(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
                )) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.ws.close(None).await {
            Ok(())
            | Err(
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
            ) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
