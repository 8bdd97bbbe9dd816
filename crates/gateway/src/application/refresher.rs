//! Snapshot Refresher
//!
//! Periodically replaces every pair's book with a REST snapshot. Runs apart
//! from the websocket path and heals any diff-stream desync without touching
//! the session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tributary_core::{ExchangeId, OrderBookEvent, TradingPair};

use super::settings::RefresherSettings;
use crate::domain::Connector;
use crate::presentation::MarketDataSink;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("snapshot fetch failed for all {0} pairs")]
    AllFailed(usize),
    #[error("order book output closed")]
    SinkClosed,
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: usize,
    pub failed: Vec<TradingPair>,
}

/// Time until the next `interval`-sized window boundary, counted from the
/// UNIX epoch
pub fn delay_until_next_window(now: DateTime<Utc>, interval: Duration) -> Duration {
    let window = interval.as_millis() as i64;
    if window <= 0 {
        return Duration::ZERO;
    }
    let now_ms = now.timestamp_millis();
    let next = (now_ms.div_euclid(window) + 1) * window;
    Duration::from_millis((next - now_ms) as u64)
}

pub struct SnapshotRefresher<C: Connector + ?Sized> {
    exchange: ExchangeId,
    connector: Arc<C>,
    trading_pairs: Vec<TradingPair>,
    sink: MarketDataSink,
    settings: RefresherSettings,
}

impl<C: Connector + ?Sized> SnapshotRefresher<C> {
    pub fn new(
        exchange: ExchangeId,
        connector: Arc<C>,
        trading_pairs: Vec<TradingPair>,
        sink: MarketDataSink,
        settings: RefresherSettings,
    ) -> Self {
        SnapshotRefresher {
            exchange,
            connector,
            trading_pairs,
            sink,
            settings,
        }
    }

    /// Fetch and publish a snapshot for every pair. A failed pair is logged
    /// and skipped.
    pub async fn refresh_cycle(&self) -> Result<CycleReport, RefreshError> {
        let mut report = CycleReport::default();

        for pair in &self.trading_pairs {
            match self.connector.fetch_snapshot(pair).await {
                Ok(snapshot) => {
                    self.sink
                        .publish(OrderBookEvent::Snapshot(snapshot))
                        .await
                        .map_err(|_| RefreshError::SinkClosed)?;
                    report.refreshed += 1;
                }
                Err(e) => {
                    tracing::error!(
                        exchange = %self.exchange,
                        pair = %pair,
                        error = %e,
                        "snapshot fetch failed"
                    );
                    report.failed.push(pair.clone());
                }
            }
        }

        if report.refreshed == 0 && !report.failed.is_empty() {
            return Err(RefreshError::AllFailed(report.failed.len()));
        }
        Ok(report)
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            exchange = %self.exchange,
            interval_secs = self.settings.interval.as_secs(),
            "snapshot refresher started"
        );

        if self.settings.refresh_on_start && !self.refresh_until_done(&cancel).await {
            return;
        }

        loop {
            let delay = delay_until_next_window(Utc::now(), self.settings.interval);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if !self.refresh_until_done(&cancel).await {
                break;
            }
        }

        tracing::info!(exchange = %self.exchange, "snapshot refresher stopped");
    }

    /// Retry the cycle after `recovery_delay` while every pair fails.
    /// `false` means the refresher should stop.
    async fn refresh_until_done(&self, cancel: &CancellationToken) -> bool {
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                result = self.refresh_cycle() => result,
            };

            match result {
                Ok(report) => {
                    tracing::info!(
                        exchange = %self.exchange,
                        refreshed = report.refreshed,
                        failed = report.failed.len(),
                        "snapshot cycle complete"
                    );
                    return true;
                }
                Err(RefreshError::SinkClosed) => {
                    tracing::warn!(exchange = %self.exchange, "order book output closed");
                    return false;
                }
                Err(e) => {
                    tracing::error!(exchange = %self.exchange, error = %e, "snapshot cycle failed");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(self.settings.recovery_delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fakes::{FakeConnector, btc, eth, snapshot};
    use crate::error::FetchError;
    use crate::presentation::MarketDataStreams;
    use chrono::TimeZone;

    fn refresher(connector: Arc<FakeConnector>) -> (SnapshotRefresher<FakeConnector>, MarketDataStreams) {
        let (sink, streams) = MarketDataSink::channel(16);
        let refresher = SnapshotRefresher::new(
            ExchangeId::new("fake"),
            connector,
            vec![btc(), eth()],
            sink,
            RefresherSettings::default(),
        );
        (refresher, streams)
    }

    fn network_error() -> FetchError {
        FetchError::Network("timed out".into())
    }

    #[test]
    fn test_delay_aligned_to_window() {
        let hour = Duration::from_secs(3600);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        assert_eq!(delay_until_next_window(now, hour), Duration::from_secs(45 * 60));

        let boundary = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        assert_eq!(delay_until_next_window(boundary, hour), hour);
        assert_eq!(delay_until_next_window(now, Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_failed_pair_does_not_stop_cycle() {
        let connector = Arc::new(FakeConnector::new());
        connector.script_snapshot(&btc(), Err(network_error()));
        connector.script_snapshot(&eth(), Ok(snapshot(&eth(), 500)));
        let (refresher, mut streams) = refresher(Arc::clone(&connector));

        let report = refresher.refresh_cycle().await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failed, vec![btc()]);

        match streams.order_book.recv().await.unwrap() {
            OrderBookEvent::Snapshot(s) => {
                assert_eq!(s.trading_pair, eth());
                assert_eq!(s.update_id, 500);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_pairs_failing_is_cycle_error() {
        let connector = Arc::new(FakeConnector::new());
        connector.script_snapshot(&btc(), Err(network_error()));
        connector.script_snapshot(&eth(), Err(network_error()));
        let (refresher, _streams) = refresher(connector);

        assert_eq!(refresher.refresh_cycle().await, Err(RefreshError::AllFailed(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_cycle_after_recovery_delay() {
        let connector = Arc::new(FakeConnector::new());
        connector.script_snapshot(&btc(), Err(network_error()));
        connector.script_snapshot(&eth(), Err(network_error()));
        let (refresher, mut streams) = refresher(Arc::clone(&connector));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresher.run(cancel.clone()));

        // First cycle fails entirely, the retry 5s later succeeds
        let first = streams.order_book.recv().await.unwrap();
        assert_eq!(first.trading_pair(), &btc());
        let second = streams.order_book.recv().await.unwrap();
        assert_eq!(second.trading_pair(), &eth());
        assert_eq!(connector.snapshot_fetches(), 4);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_output_stops_refresher() {
        let connector = Arc::new(FakeConnector::new());
        let (refresher, streams) = refresher(connector);
        drop(streams);

        assert_eq!(refresher.refresh_cycle().await, Err(RefreshError::SinkClosed));
        refresher.run(CancellationToken::new()).await;
    }
}
