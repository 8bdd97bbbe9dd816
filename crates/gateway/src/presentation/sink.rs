//! Market Data Sink
//!
//! Caller-supplied output queues. Book events (snapshots and diffs) share one
//! ordered stream, trades and funding records each get their own.

use thiserror::Error;
use tokio::sync::mpsc;
use tributary_core::{FundingEvent, OrderBookEvent, TradeEvent};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("{0} output closed")]
    Closed(&'static str),
}

/// Sending half of the output streams. Cheap to clone; one clone per task.
#[derive(Debug, Clone)]
pub struct MarketDataSink {
    order_book: mpsc::Sender<OrderBookEvent>,
    trades: mpsc::Sender<TradeEvent>,
    funding: mpsc::Sender<FundingEvent>,
}

/// Receiving half handed back to the caller
#[derive(Debug)]
pub struct MarketDataStreams {
    pub order_book: mpsc::Receiver<OrderBookEvent>,
    pub trades: mpsc::Receiver<TradeEvent>,
    pub funding: mpsc::Receiver<FundingEvent>,
}

impl MarketDataSink {
    pub fn new(
        order_book: mpsc::Sender<OrderBookEvent>,
        trades: mpsc::Sender<TradeEvent>,
        funding: mpsc::Sender<FundingEvent>,
    ) -> Self {
        MarketDataSink {
            order_book,
            trades,
            funding,
        }
    }

    /// Sink plus matching receivers, each bounded to `capacity`
    pub fn channel(capacity: usize) -> (Self, MarketDataStreams) {
        let (book_tx, book_rx) = mpsc::channel(capacity);
        let (trade_tx, trade_rx) = mpsc::channel(capacity);
        let (funding_tx, funding_rx) = mpsc::channel(capacity);
        (
            MarketDataSink::new(book_tx, trade_tx, funding_tx),
            MarketDataStreams {
                order_book: book_rx,
                trades: trade_rx,
                funding: funding_rx,
            },
        )
    }

    /// Deliver an event to the stream for its kind. Waits while the
    /// receiver is full.
    pub async fn publish(&self, event: OrderBookEvent) -> Result<(), SinkError> {
        match event {
            OrderBookEvent::Trade(trade) => self
                .trades
                .send(trade)
                .await
                .map_err(|_| SinkError::Closed("trade")),
            book => self
                .order_book
                .send(book)
                .await
                .map_err(|_| SinkError::Closed("order book")),
        }
    }

    pub async fn publish_funding(&self, event: FundingEvent) -> Result<(), SinkError> {
        self.funding
            .send(event)
            .await
            .map_err(|_| SinkError::Closed("funding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tributary_core::{BookDiff, FundingInfoUpdate, TradeSide, TradingPair};

    fn btc() -> TradingPair {
        TradingPair::new("BTC", "USDT")
    }

    #[tokio::test]
    async fn test_publish_routes_by_event_kind() {
        let (sink, mut streams) = MarketDataSink::channel(8);

        let diff = BookDiff {
            trading_pair: btc(),
            first_update_id: 5,
            update_id: 6,
            bids: vec![],
            asks: vec![],
            timestamp: Utc::now(),
        };
        let trade = TradeEvent {
            trading_pair: btc(),
            trade_id: "42".into(),
            update_id: 42,
            side: TradeSide::Buy,
            price: dec!(100),
            size: dec!(1),
            timestamp: Utc::now(),
        };

        sink.publish(diff.clone().into()).await.unwrap();
        sink.publish(trade.clone().into()).await.unwrap();
        sink.publish_funding(FundingEvent::Update(
            FundingInfoUpdate::new(btc()).with_rate(dec!(0.0001)),
        ))
        .await
        .unwrap();

        assert_eq!(streams.order_book.recv().await, Some(OrderBookEvent::Diff(diff)));
        assert_eq!(streams.trades.recv().await, Some(trade));
        assert!(matches!(
            streams.funding.recv().await,
            Some(FundingEvent::Update(_))
        ));
        assert!(streams.order_book.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_to_dropped_receiver_fails() {
        let (sink, streams) = MarketDataSink::channel(1);
        drop(streams);

        let err = sink
            .publish_funding(FundingEvent::Update(FundingInfoUpdate::new(btc())))
            .await
            .unwrap_err();
        assert_eq!(err, SinkError::Closed("funding"));
    }
}
