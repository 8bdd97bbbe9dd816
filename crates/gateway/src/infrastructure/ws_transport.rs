use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::domain::{WsConnection, WsConnector, WsFrame};
use crate::error::{ConnectionError, TransportError};

/// Websocket transport over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        TungsteniteConnector { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, ConnectionError> {
        let parsed = Url::parse(url).map_err(|e| ConnectionError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(parsed.as_str()))
            .await
            .map_err(|_| ConnectionError::Timeout {
                url: url.to_string(),
                timeout: self.connect_timeout,
            })?
            .map_err(|e| ConnectionError::Handshake {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(url, "websocket connected");
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WsConnection for TungsteniteConnection {
    async fn send(&mut self, frame: WsFrame) -> Result<(), TransportError> {
        let message = match frame {
            WsFrame::Text(text) => Message::Text(text.into()),
            WsFrame::Binary(data) => Message::Binary(data.into()),
            WsFrame::Ping(data) => Message::Ping(data.into()),
            WsFrame::Pong(data) => Message::Pong(data.into()),
            WsFrame::Close => Message::Close(None),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<WsFrame, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };
            let frame = match message {
                Message::Text(text) => WsFrame::Text(text.as_str().to_owned()),
                Message::Binary(data) => WsFrame::Binary(data.to_vec()),
                Message::Ping(data) => WsFrame::Ping(data.to_vec()),
                Message::Pong(data) => WsFrame::Pong(data.to_vec()),
                Message::Close(_) => WsFrame::Close,
                Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
