//! Market Data Source
//!
//! Wires one exchange's components together and runs each as its own task:
//!
//! ```text
//! WsSession ─► ListenerLifecycle ─► ChannelRouter ─┬─► snapshot consumer ─┐
//!                                                  ├─► diff consumer ─────┼─► MarketDataSink
//!                                                  ├─► trade consumer ────┤
//!                                                  └─► FundingListener ───┤
//! REST ─────────────────────────► SnapshotRefresher ──────────────────────┘
//! ```
//!
//! Exchanges never share components; run one source per exchange.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tributary_core::{ExchangeId, TradingPair};

use super::consumer::ChannelConsumer;
use super::funding::{FundingListener, FundingTracker};
use super::listener::{ListenerLifecycle, ListenerStats};
use super::refresher::SnapshotRefresher;
use super::router::{ChannelQueues, ChannelRouter, RouterStats};
use super::settings::DataSourceSettings;
use crate::config::{ExchangeConfig, FeedsConfig};
use crate::domain::{ChannelKey, Connector, ListenerState, PerpetualConnector, RawMessage, WsConnector};
use crate::error::{FetchError, GatewayError};
use crate::infrastructure::{TungsteniteConnector, connector_for};
use crate::presentation::MarketDataSink;

pub struct MarketDataSource<C: ?Sized> {
    exchange: ExchangeId,
    connector: Arc<C>,
    transport: Arc<dyn WsConnector>,
    trading_pairs: Vec<TradingPair>,
    settings: DataSourceSettings,
    sink: MarketDataSink,
}

impl<C: Connector + ?Sized + 'static> MarketDataSource<C> {
    pub fn new(
        exchange: ExchangeId,
        connector: Arc<C>,
        transport: Arc<dyn WsConnector>,
        trading_pairs: Vec<TradingPair>,
        settings: DataSourceSettings,
        sink: MarketDataSink,
    ) -> Self {
        MarketDataSource {
            exchange,
            connector,
            transport,
            trading_pairs,
            settings,
            sink,
        }
    }

    /// Start the book and trade feeds. Funding messages, if any arrive, are
    /// dropped as unmapped.
    pub fn spawn(self) -> DataSourceHandle<C> {
        let (handle, _queues) = self.start(false);
        handle
    }

    fn start(&self, with_funding: bool) -> (DataSourceHandle<C>, ChannelQueues) {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let channels: Vec<ChannelKey> = self
            .connector
            .channels()
            .into_iter()
            .filter(|key| with_funding || *key != ChannelKey::Funding)
            .collect();

        let classifier_connector = Arc::clone(&self.connector);
        let (router, mut queues) = ChannelRouter::new(
            self.exchange.clone(),
            &channels,
            self.settings.queue_capacity,
            Arc::new(move |message: &RawMessage| classifier_connector.classify(message)),
        );
        let router_stats = router.stats();

        for key in [ChannelKey::Snapshot, ChannelKey::Diff, ChannelKey::Trade] {
            if let Some(queue) = queues.take(key) {
                let consumer = ChannelConsumer::new(
                    self.exchange.clone(),
                    key,
                    Arc::clone(&self.connector),
                    queue,
                    self.sink.clone(),
                );
                tasks.push(tokio::spawn(consumer.run(cancel.clone())));
            }
        }

        if self.settings.refresher.enabled {
            let refresher = SnapshotRefresher::new(
                self.exchange.clone(),
                Arc::clone(&self.connector),
                self.trading_pairs.clone(),
                self.sink.clone(),
                self.settings.refresher.clone(),
            );
            tasks.push(tokio::spawn(refresher.run(cancel.clone())));
        }

        let listener = ListenerLifecycle::new(
            self.exchange.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.transport),
            router,
            self.trading_pairs.clone(),
            self.settings.listener.clone(),
        );
        let state = listener.state();
        let listener_stats = listener.stats();
        tasks.push(tokio::spawn(listener.run(cancel.clone())));

        tracing::info!(
            exchange = %self.exchange,
            connector = self.connector.name(),
            pairs = self.trading_pairs.len(),
            "market data source started"
        );

        let handle = DataSourceHandle {
            exchange: self.exchange.clone(),
            connector: Arc::clone(&self.connector),
            trading_pairs: self.trading_pairs.clone(),
            cancel,
            tasks,
            state,
            router_stats,
            listener_stats,
            funding: None,
        };
        (handle, queues)
    }
}

impl<C: PerpetualConnector + ?Sized + 'static> MarketDataSource<C> {
    /// Start the book and trade feeds plus, when enabled, the funding feed
    pub fn spawn_perpetual(self) -> DataSourceHandle<C> {
        let with_funding = self.settings.funding.enabled;
        let (mut handle, mut queues) = self.start(with_funding);
        if !with_funding {
            return handle;
        }

        let tracker = Arc::new(FundingTracker::new(
            Arc::clone(&self.connector),
            self.trading_pairs.clone(),
        ));
        let listener = FundingListener::new(
            self.exchange.clone(),
            Arc::clone(&tracker),
            queues.take(ChannelKey::Funding),
            self.sink.clone(),
            self.settings.funding.clone(),
        );
        handle.tasks.push(tokio::spawn(listener.run(handle.cancel.clone())));
        handle.funding = Some(tracker);
        handle
    }
}

/// Control surface of a running data source
pub struct DataSourceHandle<C: ?Sized> {
    exchange: ExchangeId,
    connector: Arc<C>,
    trading_pairs: Vec<TradingPair>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    state: watch::Receiver<ListenerState>,
    router_stats: Arc<RouterStats>,
    listener_stats: Arc<ListenerStats>,
    funding: Option<Arc<FundingTracker<C>>>,
}

impl<C: ?Sized> DataSourceHandle<C> {
    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    pub fn trading_pairs(&self) -> &[TradingPair] {
        &self.trading_pairs
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn listener_state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Watch listener state transitions
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    pub fn router_stats(&self) -> &RouterStats {
        &self.router_stats
    }

    pub fn listener_stats(&self) -> &ListenerStats {
        &self.listener_stats
    }

    /// Funding state, present for perpetual sources with funding enabled
    pub fn funding(&self) -> Option<&Arc<FundingTracker<C>>> {
        self.funding.as_ref()
    }

    /// Cancel every task and wait for them to finish. The websocket session
    /// is closed before this returns.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(exchange = %self.exchange, error = %e, "data source task failed");
            }
        }
        tracing::info!(exchange = %self.exchange, "market data source stopped");
    }
}

impl<C: Connector + ?Sized> DataSourceHandle<C> {
    pub async fn get_last_traded_prices(
        &self,
        trading_pairs: &[TradingPair],
    ) -> Result<HashMap<TradingPair, Decimal>, FetchError> {
        self.connector.fetch_last_traded_prices(trading_pairs).await
    }
}

/// Start a perpetual data source for every enabled exchange in `config`
pub fn spawn_enabled<F>(
    config: &FeedsConfig,
    mut sink_for: F,
) -> Result<Vec<DataSourceHandle<dyn PerpetualConnector>>, GatewayError>
where
    F: FnMut(&ExchangeConfig) -> MarketDataSink,
{
    config.validate()?;
    let transport: Arc<dyn WsConnector> =
        Arc::new(TungsteniteConnector::new(config.global.connect_timeout()));

    let handles = config
        .enabled_exchanges()
        .into_iter()
        .map(|exchange| {
            MarketDataSource::new(
                exchange.exchange_id(),
                connector_for(exchange),
                Arc::clone(&transport),
                exchange.trading_pairs.clone(),
                exchange.settings(&config.global),
                sink_for(exchange),
            )
            .spawn_perpetual()
        })
        .collect();
    Ok(handles)
}
