//! In-memory exchange for the gateway integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tributary_core::{
    BookDiff, BookLevel, BookSnapshot, FundingInfo, FundingInfoUpdate, OrderBookEvent,
    TradingPair,
};
use tributary_gateway::domain::{WsConnection, WsFrame, WsPostProcessor};
use tributary_gateway::infrastructure::JsonDecoder;
use tributary_gateway::{
    ChannelKey, ConnectionError, Connector, FetchError, ParseError, PerpetualConnector,
    RawMessage, TransportError, WsConnector, WsRequest,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn btc() -> TradingPair {
    TradingPair::new("BTC", "USDT")
}

/// Exchange side of a scripted connection
pub struct Venue {
    inbound: mpsc::UnboundedSender<WsFrame>,
}

impl Venue {
    pub fn push(&self, value: Value) {
        let _ = self.inbound.send(WsFrame::Text(value.to_string()));
    }
}

#[derive(Default)]
pub struct MemoryTransport {
    scripted: Mutex<VecDeque<mpsc::UnboundedReceiver<WsFrame>>>,
    attempts: AtomicUsize,
    open: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryTransport::default())
    }

    /// Next connect succeeds; later ones fail once the script runs out
    pub fn accept_next(&self) -> Venue {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripted.lock().push_back(rx);
        Venue { inbound: tx }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsConnector for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let inbound = self.scripted.lock().pop_front().ok_or_else(|| ConnectionError::Handshake {
            url: url.to_string(),
            reason: "refused".into(),
        })?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            inbound,
            open: Arc::clone(&self.open),
            released: false,
        }))
    }
}

struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<WsFrame>,
    open: Arc<AtomicUsize>,
    released: bool,
}

impl MemoryConnection {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl WsConnection for MemoryConnection {
    async fn send(&mut self, _frame: WsFrame) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<WsFrame, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.release();
        Ok(())
    }
}

/// Toy venue: messages are JSON objects tagged by `ch`
#[derive(Default)]
pub struct MemoryConnector {
    snapshots: Mutex<HashMap<TradingPair, BookSnapshot>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryConnector::default())
    }

    pub fn set_snapshot(&self, snapshot: BookSnapshot) {
        self.snapshots
            .lock()
            .insert(snapshot.trading_pair.clone(), snapshot);
    }
}

fn levels(value: &Value, name: &str) -> Vec<BookLevel> {
    value
        .get(name)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let price = row.get(0)?.as_str()?.parse().ok()?;
                    let size = row.get(1)?.as_str()?.parse().ok()?;
                    Some(BookLevel::new(price, size))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn pair(value: &Value) -> Result<TradingPair, ParseError> {
    let raw = value
        .get("pair")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::missing("pair"))?;
    TradingPair::parse(raw).map_err(|_| ParseError::UnknownSymbol(raw.to_string()))
}

fn id(value: &Value, name: &str) -> Result<u64, ParseError> {
    value
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| ParseError::missing(name))
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    fn channels(&self) -> Vec<ChannelKey> {
        vec![ChannelKey::Snapshot, ChannelKey::Diff, ChannelKey::Funding]
    }

    fn subscribe_requests(&self, _trading_pairs: &[TradingPair]) -> Vec<WsRequest> {
        vec![WsRequest::Json(json!({ "op": "subscribe" }))]
    }

    fn classify(&self, message: &RawMessage) -> ChannelKey {
        match message.as_json().and_then(|v| v.get("ch")).and_then(Value::as_str) {
            Some("snapshot") => ChannelKey::Snapshot,
            Some("diff") => ChannelKey::Diff,
            Some("funding") => ChannelKey::Funding,
            _ => ChannelKey::Unknown,
        }
    }

    fn post_processors(&self) -> Vec<Arc<dyn WsPostProcessor>> {
        vec![Arc::new(JsonDecoder)]
    }

    fn parse_snapshot(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let value = message.as_json().ok_or(ParseError::NotJson)?;
        Ok(vec![OrderBookEvent::Snapshot(BookSnapshot {
            trading_pair: pair(value)?,
            update_id: id(value, "last")?,
            bids: levels(value, "bids"),
            asks: levels(value, "asks"),
            timestamp: message.received_at,
        })])
    }

    fn parse_diff(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let value = message.as_json().ok_or(ParseError::NotJson)?;
        Ok(vec![OrderBookEvent::Diff(BookDiff {
            trading_pair: pair(value)?,
            first_update_id: id(value, "first")?,
            update_id: id(value, "last")?,
            bids: levels(value, "bids"),
            asks: levels(value, "asks"),
            timestamp: message.received_at,
        })])
    }

    async fn fetch_snapshot(&self, trading_pair: &TradingPair) -> Result<BookSnapshot, FetchError> {
        self.snapshots
            .lock()
            .get(trading_pair)
            .cloned()
            .ok_or_else(|| FetchError::UnknownPair(trading_pair.clone()))
    }
}

#[async_trait]
impl PerpetualConnector for MemoryConnector {
    fn parse_funding(&self, message: &RawMessage) -> Result<Vec<FundingInfoUpdate>, ParseError> {
        let value = message.as_json().ok_or(ParseError::NotJson)?;
        let mut update = FundingInfoUpdate::new(pair(value)?);
        if let Some(rate) = value.get("rate").and_then(Value::as_str) {
            update = update.with_rate(rate.parse().map_err(|_| ParseError::invalid("rate", rate))?);
        }
        Ok(vec![update])
    }

    async fn fetch_funding_info(&self, trading_pair: &TradingPair) -> Result<FundingInfo, FetchError> {
        Ok(FundingInfo {
            trading_pair: trading_pair.clone(),
            index_price: dec!(100),
            mark_price: dec!(100),
            next_funding_utc_timestamp: Utc::now().timestamp() + 3600,
            rate: dec!(0.0001),
        })
    }
}
