//! Listener Lifecycle
//!
//! Owns the websocket session for one exchange:
//!
//! ```text
//! Disconnected ──► Connecting ──► Subscribing ──► Listening
//!      ▲                │                             │
//!      │                ▼                             ▼
//!      └────────────  Backoff  ◄──────── error / peer close
//! ```
//!
//! There is no terminal state. Every failure ends the session, waits out a
//! fixed reconnect delay and starts over; only cancellation stops the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tributary_core::{ExchangeId, TradingPair};

use super::router::ChannelRouter;
use super::settings::ListenerSettings;
use crate::domain::{Connector, ControlFrame, ListenerState, RawMessage, WsConnector};
use crate::error::ListenerError;
use crate::infrastructure::WsSession;

/// Session counters
#[derive(Debug, Default)]
pub struct ListenerStats {
    connect_attempts: AtomicU64,
    sessions_established: AtomicU64,
    keepalives_sent: AtomicU64,
    peer_closes: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ListenerStats {
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn sessions_established(&self) -> u64 {
        self.sessions_established.load(Ordering::Relaxed)
    }

    pub fn keepalives_sent(&self) -> u64 {
        self.keepalives_sent.load(Ordering::Relaxed)
    }

    /// Sessions the peer ended cleanly
    pub fn peer_closes(&self) -> u64 {
        self.peer_closes.load(Ordering::Relaxed)
    }

    /// Sessions ended by a connection-level error
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

pub struct ListenerLifecycle<C: Connector + ?Sized> {
    exchange: ExchangeId,
    connector: Arc<C>,
    transport: Arc<dyn WsConnector>,
    router: ChannelRouter,
    trading_pairs: Vec<TradingPair>,
    settings: ListenerSettings,
    state: watch::Sender<ListenerState>,
    stats: Arc<ListenerStats>,
}

impl<C: Connector + ?Sized> ListenerLifecycle<C> {
    pub fn new(
        exchange: ExchangeId,
        connector: Arc<C>,
        transport: Arc<dyn WsConnector>,
        router: ChannelRouter,
        trading_pairs: Vec<TradingPair>,
        settings: ListenerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        ListenerLifecycle {
            exchange,
            connector,
            transport,
            router,
            trading_pairs,
            settings,
            state,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `cancel` fires. The session is always disconnected before
    /// this returns.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(exchange = %self.exchange, url = %self.settings.ws_url, "listener started");

        loop {
            let mut session = WsSession::new(Arc::clone(&self.transport))
                .with_pre_processors(self.connector.pre_processors())
                .with_post_processors(self.connector.post_processors());

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.run_session(&mut session) => Some(result),
            };

            session.disconnect().await;
            self.set_state(ListenerState::Disconnected);

            match outcome {
                None => break,
                Some(Ok(())) => {
                    self.stats.peer_closes.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(exchange = %self.exchange, "websocket closed by peer");
                }
                Some(Err(e)) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    *self.stats.last_error.lock() = Some(e.to_string());
                    tracing::error!(
                        exchange = %self.exchange,
                        operation = e.operation(),
                        error = %e,
                        "listener session failed"
                    );
                }
            }

            self.set_state(ListenerState::Backoff);
            tracing::info!(
                exchange = %self.exchange,
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "reconnecting after delay"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }

        self.set_state(ListenerState::Disconnected);
        tracing::info!(exchange = %self.exchange, "listener stopped");
    }

    /// One connect/subscribe/listen pass. `Ok` means the peer closed the
    /// connection.
    async fn run_session(&self, session: &mut WsSession) -> Result<(), ListenerError> {
        self.set_state(ListenerState::Connecting);
        self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        session
            .connect(
                &self.settings.ws_url,
                self.settings.keepalive_interval,
                self.settings.response_timeout,
            )
            .await?;
        self.stats.sessions_established.fetch_add(1, Ordering::Relaxed);
        tracing::info!(exchange = %self.exchange, "websocket connected");

        self.set_state(ListenerState::Subscribing);
        for request in self.connector.subscribe_requests(&self.trading_pairs) {
            session.send(request).await.map_err(ListenerError::Subscribe)?;
        }

        self.set_state(ListenerState::Listening);
        loop {
            let received = tokio::time::timeout(session.keepalive_due_in(), session.receive()).await;
            match received {
                Err(_) => {
                    session
                        .send_keepalive(self.connector.keepalive_request())
                        .await
                        .map_err(ListenerError::Keepalive)?;
                    self.stats.keepalives_sent.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(exchange = %self.exchange, "keepalive sent");
                }
                Ok(Ok(Some(message))) => self.dispatch(session, message).await?,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(ListenerError::Receive(e)),
            }
        }
    }

    /// Control frames are handled here; everything else goes to the router
    async fn dispatch(&self, session: &mut WsSession, message: RawMessage) -> Result<(), ListenerError> {
        match self.connector.control_frame(&message) {
            Some(ControlFrame::Reply(request)) => {
                session.send(request).await.map_err(ListenerError::Keepalive)?;
            }
            Some(ControlFrame::KeepaliveAck) => {
                tracing::trace!(exchange = %self.exchange, "keepalive acknowledged");
            }
            Some(ControlFrame::SubscriptionAck { success: true, detail }) => {
                tracing::info!(exchange = %self.exchange, %detail, "subscription acknowledged");
            }
            Some(ControlFrame::SubscriptionAck { success: false, detail }) => {
                tracing::error!(exchange = %self.exchange, %detail, "subscription rejected");
            }
            None => {
                self.router.route(message);
            }
        }
        Ok(())
    }

    fn set_state(&self, state: ListenerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(exchange = %self.exchange, from = %previous, to = %state, "listener state");
        }
    }
}
