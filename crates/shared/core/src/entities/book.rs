use serde::{Deserialize, Serialize};

use super::TradeEvent;
use crate::markets::TradingPair;
use crate::values::{Price, Size, Timestamp, UpdateId};

/// Order book level (price + size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Size,
}

impl BookLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }

    /// A zero size in a diff removes the price level
    pub fn is_removal(&self) -> bool {
        self.size.is_zero()
    }
}

/// Full replacement of a pair's book at `update_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub trading_pair: TradingPair,
    pub update_id: UpdateId,
    /// Best first (descending price)
    pub bids: Vec<BookLevel>,
    /// Best first (ascending price)
    pub asks: Vec<BookLevel>,
    pub timestamp: Timestamp,
}

/// Incremental change covering update ids `first_update_id..=update_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDiff {
    pub trading_pair: TradingPair,
    pub first_update_id: UpdateId,
    pub update_id: UpdateId,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: Timestamp,
}

/// Numeric tags shared with downstream book trackers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderBookEventKind {
    Snapshot = 1,
    Diff = 2,
    Trade = 3,
}

/// Normalized event produced by connector parse callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderBookEvent {
    Snapshot(BookSnapshot),
    Diff(BookDiff),
    Trade(TradeEvent),
}

impl OrderBookEvent {
    pub fn kind(&self) -> OrderBookEventKind {
        match self {
            OrderBookEvent::Snapshot(_) => OrderBookEventKind::Snapshot,
            OrderBookEvent::Diff(_) => OrderBookEventKind::Diff,
            OrderBookEvent::Trade(_) => OrderBookEventKind::Trade,
        }
    }

    pub fn trading_pair(&self) -> &TradingPair {
        match self {
            OrderBookEvent::Snapshot(s) => &s.trading_pair,
            OrderBookEvent::Diff(d) => &d.trading_pair,
            OrderBookEvent::Trade(t) => &t.trading_pair,
        }
    }

    pub fn update_id(&self) -> UpdateId {
        match self {
            OrderBookEvent::Snapshot(s) => s.update_id,
            OrderBookEvent::Diff(d) => d.update_id,
            OrderBookEvent::Trade(t) => t.update_id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            OrderBookEvent::Snapshot(s) => s.timestamp,
            OrderBookEvent::Diff(d) => d.timestamp,
            OrderBookEvent::Trade(t) => t.timestamp,
        }
    }

    /// Snapshots and diffs feed the book; trades go to the trade stream
    pub fn is_book_update(&self) -> bool {
        !matches!(self, OrderBookEvent::Trade(_))
    }
}

impl From<BookSnapshot> for OrderBookEvent {
    fn from(snapshot: BookSnapshot) -> Self {
        OrderBookEvent::Snapshot(snapshot)
    }
}

impl From<BookDiff> for OrderBookEvent {
    fn from(diff: BookDiff) -> Self {
        OrderBookEvent::Diff(diff)
    }
}

impl From<TradeEvent> for OrderBookEvent {
    fn from(trade: TradeEvent) -> Self {
        OrderBookEvent::Trade(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_accessors() {
        let pair = TradingPair::new("BTC", "USDT");
        let event: OrderBookEvent = BookDiff {
            trading_pair: pair.clone(),
            first_update_id: 101,
            update_id: 102,
            bids: vec![BookLevel::new(dec!(10), dec!(0))],
            asks: vec![],
            timestamp: Utc::now(),
        }
        .into();

        assert_eq!(event.kind(), OrderBookEventKind::Diff);
        assert_eq!(event.kind() as u8, 2);
        assert_eq!(event.trading_pair(), &pair);
        assert_eq!(event.update_id(), 102);
        assert!(event.is_book_update());
    }

    #[test]
    fn test_zero_size_is_removal() {
        assert!(BookLevel::new(dec!(10), dec!(0)).is_removal());
        assert!(!BookLevel::new(dec!(10), dec!(0.5)).is_removal());
    }
}
