use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use futures_util::stream;
use tokio::time::Instant;

use crate::domain::{
    Payload, RawMessage, WsConnection, WsConnector, WsFrame, WsPostProcessor, WsPreProcessor,
    WsRequest,
};
use crate::error::{ConnectionError, TransportError};

const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(20);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// One physical websocket connection plus its processor chains.
///
/// Single reader and single writer: all methods take `&mut self`, so the
/// owner serializes subscribe, keepalive and reply sends by construction.
pub struct WsSession {
    transport: Arc<dyn WsConnector>,
    connection: Option<Box<dyn WsConnection>>,
    pre_processors: Vec<Arc<dyn WsPreProcessor>>,
    post_processors: Vec<Arc<dyn WsPostProcessor>>,
    keepalive_interval: Duration,
    response_timeout: Duration,
    last_recv: Option<Instant>,
    last_keepalive: Option<Instant>,
}

impl WsSession {
    pub fn new(transport: Arc<dyn WsConnector>) -> Self {
        WsSession {
            transport,
            connection: None,
            pre_processors: Vec::new(),
            post_processors: Vec::new(),
            keepalive_interval: DEFAULT_KEEPALIVE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            last_recv: None,
            last_keepalive: None,
        }
    }

    pub fn with_pre_processors(mut self, processors: Vec<Arc<dyn WsPreProcessor>>) -> Self {
        self.pre_processors.extend(processors);
        self
    }

    pub fn with_post_processors(mut self, processors: Vec<Arc<dyn WsPostProcessor>>) -> Self {
        self.post_processors.extend(processors);
        self
    }

    /// Open the connection. An already open connection is closed first.
    pub async fn connect(
        &mut self,
        url: &str,
        keepalive_interval: Duration,
        response_timeout: Duration,
    ) -> Result<(), ConnectionError> {
        self.disconnect().await;

        let connection = self.transport.connect(url).await?;
        self.connection = Some(connection);
        self.keepalive_interval = keepalive_interval;
        self.response_timeout = response_timeout;
        self.last_recv = Some(Instant::now());
        self.last_keepalive = None;
        Ok(())
    }

    /// Close the connection if open. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take()
            && let Err(e) = connection.close().await
        {
            tracing::debug!(error = %e, "websocket close handshake failed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub async fn send(&mut self, request: WsRequest) -> Result<(), TransportError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;

        let mut request = request;
        for processor in &self.pre_processors {
            request = processor.pre_process(request)?;
        }
        connection.send(request.into_frame()?).await
    }

    /// Send a keepalive and restart the idle clock
    pub async fn send_keepalive(&mut self, request: WsRequest) -> Result<(), TransportError> {
        self.send(request).await?;
        self.last_keepalive = Some(Instant::now());
        Ok(())
    }

    /// Next message, or `Ok(None)` once the connection is closed (by the
    /// peer or by `disconnect`). Ping/pong frames only refresh the
    /// last-received marker.
    pub async fn receive(&mut self) -> Result<Option<RawMessage>, TransportError> {
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Ok(None);
            };

            let idle = self.last_recv.map(|t| t.elapsed()).unwrap_or_default();
            let remaining = self.response_timeout.saturating_sub(idle);

            let received = tokio::time::timeout(remaining, connection.recv()).await;
            let frame = match received {
                Err(_) => return Err(TransportError::ResponseTimeout(self.response_timeout)),
                Ok(None) => {
                    self.connection = None;
                    return Ok(None);
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(frame))) => frame,
            };
            self.last_recv = Some(Instant::now());

            let payload = match frame {
                WsFrame::Text(text) => Payload::Text(text),
                WsFrame::Binary(data) => Payload::Binary(data),
                WsFrame::Ping(_) | WsFrame::Pong(_) => continue,
                WsFrame::Close => {
                    self.disconnect().await;
                    return Ok(None);
                }
            };

            let mut message = RawMessage::new(payload);
            for processor in &self.post_processors {
                message = processor.post_process(message)?;
            }
            return Ok(Some(message));
        }
    }

    /// Lazy message stream. Ends on close; yields an error at most once and
    /// then ends as well.
    pub fn messages(&mut self) -> impl Stream<Item = Result<RawMessage, TransportError>> + '_ {
        stream::unfold(Some(self), |session| async move {
            let session = session?;
            match session.receive().await {
                Ok(Some(message)) => Some((Ok(message), Some(session))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub fn last_recv_time(&self) -> Option<Instant> {
        self.last_recv
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Time left before the connection counts as idle
    pub fn keepalive_due_in(&self) -> Duration {
        let reference = match (self.last_recv, self.last_keepalive) {
            (Some(recv), Some(ping)) => recv.max(ping),
            (Some(t), None) | (None, Some(t)) => t,
            (None, None) => return Duration::ZERO,
        };
        self.keepalive_interval.saturating_sub(reference.elapsed())
    }
}
