//! Perpetual funding feed
//!
//! `FundingTracker` keeps the latest `FundingInfo` per pair. The
//! `FundingListener` bootstraps it over REST, then keeps it current from the
//! connector's funding channel or, for venues without one, by polling.
//! Every pair's first event on the output is a full `FundingEvent::Info`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tributary_core::{ExchangeId, FundingEvent, FundingInfo, FundingInfoUpdate, TradingPair};

use super::settings::FundingSettings;
use crate::domain::{PerpetualConnector, RawMessage};
use crate::error::FetchError;
use crate::presentation::MarketDataSink;

/// Latest funding state per pair
pub struct FundingTracker<C: ?Sized> {
    connector: Arc<C>,
    trading_pairs: Vec<TradingPair>,
    infos: DashMap<TradingPair, FundingInfo>,
}

impl<C: PerpetualConnector + ?Sized> FundingTracker<C> {
    pub fn new(connector: Arc<C>, trading_pairs: Vec<TradingPair>) -> Self {
        FundingTracker {
            connector,
            trading_pairs,
            infos: DashMap::new(),
        }
    }

    /// Cached info, fetched over REST on first use
    pub async fn get_funding_info(&self, pair: &TradingPair) -> Result<FundingInfo, FetchError> {
        if let Some(info) = self.funding_info(pair) {
            return Ok(info);
        }
        self.refresh(pair).await
    }

    /// Fetch over REST and replace the cached info
    pub async fn refresh(&self, pair: &TradingPair) -> Result<FundingInfo, FetchError> {
        let info = self.connector.fetch_funding_info(pair).await?;
        self.infos.insert(pair.clone(), info.clone());
        Ok(info)
    }

    /// Apply the present fields of `update`. False when the pair has no
    /// info yet.
    pub fn merge(&self, update: &FundingInfoUpdate) -> bool {
        match self.infos.get_mut(&update.trading_pair) {
            Some(mut info) => info.apply(update),
            None => false,
        }
    }

    pub fn funding_info(&self, pair: &TradingPair) -> Option<FundingInfo> {
        self.infos.get(pair).map(|info| info.clone())
    }

    /// Copy of every cached entry
    pub fn all_funding_info(&self) -> HashMap<TradingPair, FundingInfo> {
        self.infos
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// True once every configured pair has info
    pub fn is_funding_info_initialized(&self) -> bool {
        self.trading_pairs.iter().all(|pair| self.infos.contains_key(pair))
    }

    pub fn trading_pairs(&self) -> &[TradingPair] {
        &self.trading_pairs
    }
}

pub struct FundingListener<C: PerpetualConnector + ?Sized> {
    exchange: ExchangeId,
    tracker: Arc<FundingTracker<C>>,
    /// `None` when the connector has no funding push channel
    queue: Option<mpsc::Receiver<RawMessage>>,
    sink: MarketDataSink,
    settings: FundingSettings,
}

/// The output went away; nothing left to do
struct OutputClosed;

impl<C: PerpetualConnector + ?Sized> FundingListener<C> {
    pub fn new(
        exchange: ExchangeId,
        tracker: Arc<FundingTracker<C>>,
        queue: Option<mpsc::Receiver<RawMessage>>,
        sink: MarketDataSink,
        settings: FundingSettings,
    ) -> Self {
        FundingListener {
            exchange,
            tracker,
            queue,
            sink,
            settings,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            exchange = %self.exchange,
            push = self.queue.is_some(),
            "funding listener started"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(()),
            result = self.listen_for_funding_info() => result,
        };
        if result.is_err() {
            tracing::warn!(exchange = %self.exchange, "funding output closed");
        }

        tracing::info!(exchange = %self.exchange, "funding listener stopped");
    }

    async fn listen_for_funding_info(&mut self) -> Result<(), OutputClosed> {
        let pending = self.bootstrap(self.tracker.trading_pairs().to_vec()).await?;
        match self.queue.take() {
            Some(queue) => self.drain(queue, pending).await,
            None => self.poll().await,
        }
    }

    /// One fetch per pair without info. Returns the pairs that failed.
    async fn bootstrap(&self, pairs: Vec<TradingPair>) -> Result<Vec<TradingPair>, OutputClosed> {
        let mut failed = Vec::new();
        for pair in pairs {
            if self.tracker.funding_info(&pair).is_some() {
                continue;
            }
            match self.tracker.refresh(&pair).await {
                Ok(info) => self.publish(FundingEvent::Info(info)).await?,
                Err(e) => {
                    tracing::error!(
                        exchange = %self.exchange,
                        pair = %pair,
                        error = %e,
                        "funding bootstrap failed"
                    );
                    failed.push(pair);
                }
            }
        }
        Ok(failed)
    }

    /// Applies pushed updates. Pairs still missing info are retried every
    /// `retry_delay` alongside.
    async fn drain(
        &self,
        mut queue: mpsc::Receiver<RawMessage>,
        mut pending: Vec<TradingPair>,
    ) -> Result<(), OutputClosed> {
        let mut retry_at = Instant::now() + self.settings.retry_delay;
        loop {
            tokio::select! {
                message = queue.recv() => match message {
                    Some(message) => self.handle_message(&message).await?,
                    None => return Ok(()),
                },
                _ = tokio::time::sleep_until(retry_at), if !pending.is_empty() => {
                    pending = self.bootstrap(pending).await?;
                    retry_at = Instant::now() + self.settings.retry_delay;
                }
            }
        }
    }

    async fn handle_message(&self, message: &RawMessage) -> Result<(), OutputClosed> {
        let updates = match self.tracker.connector.parse_funding(message) {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!(
                    exchange = %self.exchange,
                    channel = "funding",
                    error = %e,
                    "failed to parse message"
                );
                return Ok(());
            }
        };

        for update in updates {
            if update.is_empty() {
                continue;
            }
            if self.tracker.funding_info(&update.trading_pair).is_none() {
                match self.tracker.get_funding_info(&update.trading_pair).await {
                    Ok(info) => self.publish(FundingEvent::Info(info)).await?,
                    Err(e) => {
                        tracing::warn!(
                            exchange = %self.exchange,
                            pair = %update.trading_pair,
                            error = %e,
                            "dropping funding update without bootstrap info"
                        );
                        continue;
                    }
                }
            }
            self.tracker.merge(&update);
            self.publish(FundingEvent::Update(update)).await?;
        }
        Ok(())
    }

    /// Full-field updates every `poll_interval`. A pair whose bootstrap
    /// failed gets its `Info` from the first poll that succeeds.
    async fn poll(&self) -> Result<(), OutputClosed> {
        loop {
            tokio::time::sleep(self.settings.poll_interval).await;
            for pair in self.tracker.trading_pairs() {
                let known = self.tracker.funding_info(pair).is_some();
                match self.tracker.refresh(pair).await {
                    Ok(info) if known => {
                        self.publish(FundingEvent::Update(FundingInfoUpdate::from(&info)))
                            .await?
                    }
                    Ok(info) => self.publish(FundingEvent::Info(info)).await?,
                    Err(e) => {
                        tracing::error!(
                            exchange = %self.exchange,
                            pair = %pair,
                            error = %e,
                            "funding poll failed"
                        );
                    }
                }
            }
        }
    }

    async fn publish(&self, event: FundingEvent) -> Result<(), OutputClosed> {
        self.sink.publish_funding(event).await.map_err(|_| OutputClosed)
    }
}
