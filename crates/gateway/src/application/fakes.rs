//! In-memory transport and connector used by the application tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tributary_core::{
    BookDiff, BookLevel, BookSnapshot, FundingInfo, FundingInfoUpdate, OrderBookEvent,
    TradeEvent, TradeSide, TradingPair,
};

use crate::domain::{
    ChannelKey, Connector, ControlFrame, PerpetualConnector, RawMessage, WsConnection,
    WsConnector, WsFrame, WsPostProcessor, WsRequest,
};
use crate::error::{ConnectionError, FetchError, ParseError, TransportError};
use crate::infrastructure::JsonDecoder;

// =============================================================================
// Transport
// =============================================================================

/// Server end of one scripted connection
pub struct ServerSide {
    inbound: mpsc::UnboundedSender<WsFrame>,
    sent: Arc<Mutex<Vec<WsFrame>>>,
}

impl ServerSide {
    pub fn push(&self, value: Value) {
        let _ = self.inbound.send(WsFrame::Text(value.to_string()));
    }

    pub fn push_frame(&self, frame: WsFrame) {
        let _ = self.inbound.send(frame);
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                WsFrame::Text(text) => serde_json::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn pings_sent(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|f| matches!(f, WsFrame::Ping(_)))
            .count()
    }
}

/// Hands out scripted connections in order; connecting fails once the
/// script is exhausted
#[derive(Default)]
pub struct FakeTransport {
    scripted: Mutex<VecDeque<FakeConnection>>,
    attempts: AtomicUsize,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeTransport::default())
    }

    pub fn script_session(&self) -> ServerSide {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        self.scripted.lock().push_back(FakeConnection {
            inbound: rx,
            sent: Arc::clone(&sent),
            closes: Arc::clone(&self.closes),
            open: Arc::clone(&self.open),
            connected: false,
            closed: false,
        });
        ServerSide { inbound: tx, sent }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Connections handed out and not yet closed or dropped
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsConnector for FakeTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let Some(mut connection) = self.scripted.lock().pop_front() else {
            return Err(ConnectionError::Handshake {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        };
        connection.connected = true;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(connection))
    }
}

struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<WsFrame>,
    sent: Arc<Mutex<Vec<WsFrame>>>,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    connected: bool,
    closed: bool,
}

impl FakeConnection {
    fn release(&mut self) {
        if self.connected && !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl WsConnection for FakeConnection {
    async fn send(&mut self, frame: WsFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<WsFrame, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.release();
        Ok(())
    }
}

// =============================================================================
// Connector
// =============================================================================

pub fn btc() -> TradingPair {
    TradingPair::new("BTC", "USDT")
}

pub fn eth() -> TradingPair {
    TradingPair::new("ETH", "USDT")
}

pub fn funding_info(pair: &TradingPair) -> FundingInfo {
    FundingInfo {
        trading_pair: pair.clone(),
        index_price: dec!(100),
        mark_price: dec!(101),
        next_funding_utc_timestamp: 1_700_000_000,
        rate: dec!(0.0001),
    }
}

pub fn snapshot(pair: &TradingPair, update_id: u64) -> BookSnapshot {
    BookSnapshot {
        trading_pair: pair.clone(),
        update_id,
        bids: vec![BookLevel::new(dec!(10), dec!(1))],
        asks: vec![BookLevel::new(dec!(11), dec!(1))],
        timestamp: Utc::now(),
    }
}

/// Connector speaking a toy protocol: every message is a JSON object whose
/// `ch` field names its channel
pub struct FakeConnector {
    channels: Vec<ChannelKey>,
    snapshots: Mutex<HashMap<TradingPair, VecDeque<Result<BookSnapshot, FetchError>>>>,
    funding: Mutex<HashMap<TradingPair, VecDeque<Result<FundingInfo, FetchError>>>>,
    snapshot_fetches: AtomicUsize,
    funding_fetches: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        FakeConnector::with_channels(vec![ChannelKey::Diff, ChannelKey::Trade, ChannelKey::Funding])
    }

    pub fn with_channels(channels: Vec<ChannelKey>) -> Self {
        FakeConnector {
            channels,
            snapshots: Mutex::new(HashMap::new()),
            funding: Mutex::new(HashMap::new()),
            snapshot_fetches: AtomicUsize::new(0),
            funding_fetches: AtomicUsize::new(0),
        }
    }

    /// Queue a result for the next snapshot fetch of `pair`. Unscripted
    /// fetches succeed.
    pub fn script_snapshot(&self, pair: &TradingPair, result: Result<BookSnapshot, FetchError>) {
        self.snapshots
            .lock()
            .entry(pair.clone())
            .or_default()
            .push_back(result);
    }

    pub fn script_funding(&self, pair: &TradingPair, result: Result<FundingInfo, FetchError>) {
        self.funding
            .lock()
            .entry(pair.clone())
            .or_default()
            .push_back(result);
    }

    pub fn snapshot_fetches(&self) -> usize {
        self.snapshot_fetches.load(Ordering::SeqCst)
    }

    pub fn funding_fetches(&self) -> usize {
        self.funding_fetches.load(Ordering::SeqCst)
    }
}

fn body(message: &RawMessage) -> Result<&Value, ParseError> {
    message.as_json().ok_or(ParseError::NotJson)
}

fn pair(value: &Value) -> Result<TradingPair, ParseError> {
    let raw = value
        .get("pair")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::missing("pair"))?;
    TradingPair::parse(raw).map_err(|_| ParseError::UnknownSymbol(raw.to_string()))
}

fn number(value: &Value, name: &str) -> Result<u64, ParseError> {
    value
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| ParseError::missing(name))
}

fn decimal(value: &Value, name: &str) -> Result<Option<Decimal>, ParseError> {
    match value.get(name).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ParseError::invalid(name, raw)),
    }
}

fn levels(value: &Value, name: &str) -> Result<Vec<BookLevel>, ParseError> {
    let Some(rows) = value.get(name).and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    rows.iter()
        .map(|row| {
            let price = row.get(0).and_then(Value::as_str).and_then(|s| s.parse().ok());
            let size = row.get(1).and_then(Value::as_str).and_then(|s| s.parse().ok());
            match (price, size) {
                (Some(price), Some(size)) => Ok(BookLevel::new(price, size)),
                _ => Err(ParseError::invalid(name, row)),
            }
        })
        .collect()
}

#[async_trait]
impl Connector for FakeConnector {
    fn name(&self) -> &str {
        "fake"
    }

    fn channels(&self) -> Vec<ChannelKey> {
        self.channels.clone()
    }

    fn subscribe_requests(&self, trading_pairs: &[TradingPair]) -> Vec<WsRequest> {
        let pairs: Vec<&str> = trading_pairs.iter().map(|p| p.as_str()).collect();
        self.channels
            .iter()
            .filter(|key| **key != ChannelKey::Snapshot)
            .map(|key| WsRequest::Json(json!({ "op": "subscribe", "channel": key.as_str(), "pairs": pairs })))
            .collect()
    }

    fn classify(&self, message: &RawMessage) -> ChannelKey {
        match message.as_json().and_then(|v| v.get("ch")).and_then(Value::as_str) {
            Some("snapshot") => ChannelKey::Snapshot,
            Some("diff") => ChannelKey::Diff,
            Some("trade") => ChannelKey::Trade,
            Some("funding") => ChannelKey::Funding,
            _ => ChannelKey::Unknown,
        }
    }

    fn control_frame(&self, message: &RawMessage) -> Option<ControlFrame> {
        let value = message.as_json()?;
        match value.get("ch").and_then(Value::as_str)? {
            "ping" => Some(ControlFrame::Reply(WsRequest::Json(json!({ "op": "pong" })))),
            "pong" => Some(ControlFrame::KeepaliveAck),
            "ack" => Some(ControlFrame::SubscriptionAck {
                success: value.get("ok").and_then(Value::as_bool).unwrap_or(false),
                detail: value.to_string(),
            }),
            _ => None,
        }
    }

    fn post_processors(&self) -> Vec<Arc<dyn WsPostProcessor>> {
        vec![Arc::new(JsonDecoder)]
    }

    fn parse_snapshot(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let value = body(message)?;
        Ok(vec![OrderBookEvent::Snapshot(BookSnapshot {
            trading_pair: pair(value)?,
            update_id: number(value, "last")?,
            bids: levels(value, "bids")?,
            asks: levels(value, "asks")?,
            timestamp: message.received_at,
        })])
    }

    fn parse_diff(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let value = body(message)?;
        Ok(vec![OrderBookEvent::Diff(BookDiff {
            trading_pair: pair(value)?,
            first_update_id: number(value, "first")?,
            update_id: number(value, "last")?,
            bids: levels(value, "bids")?,
            asks: levels(value, "asks")?,
            timestamp: message.received_at,
        })])
    }

    fn parse_trade(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let value = body(message)?;
        let id = number(value, "id")?;
        Ok(vec![OrderBookEvent::Trade(TradeEvent {
            trading_pair: pair(value)?,
            trade_id: id.to_string(),
            update_id: id,
            side: TradeSide::Buy,
            price: decimal(value, "price")?.ok_or_else(|| ParseError::missing("price"))?,
            size: decimal(value, "size")?.ok_or_else(|| ParseError::missing("size"))?,
            timestamp: message.received_at,
        })])
    }

    async fn fetch_snapshot(&self, trading_pair: &TradingPair) -> Result<BookSnapshot, FetchError> {
        let fetch = self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .snapshots
            .lock()
            .get_mut(trading_pair)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(snapshot(trading_pair, 100 + fetch as u64)))
    }

    async fn fetch_last_traded_prices(
        &self,
        trading_pairs: &[TradingPair],
    ) -> Result<HashMap<TradingPair, Decimal>, FetchError> {
        Ok(trading_pairs.iter().map(|p| (p.clone(), dec!(100.5))).collect())
    }
}

#[async_trait]
impl PerpetualConnector for FakeConnector {
    fn parse_funding(&self, message: &RawMessage) -> Result<Vec<FundingInfoUpdate>, ParseError> {
        let value = body(message)?;
        let mut update = FundingInfoUpdate::new(pair(value)?);
        if let Some(price) = decimal(value, "index")? {
            update = update.with_index_price(price);
        }
        if let Some(price) = decimal(value, "mark")? {
            update = update.with_mark_price(price);
        }
        if let Some(rate) = decimal(value, "rate")? {
            update = update.with_rate(rate);
        }
        if let Some(next) = value.get("next").and_then(Value::as_i64) {
            update = update.with_next_funding(next);
        }
        Ok(vec![update])
    }

    async fn fetch_funding_info(&self, trading_pair: &TradingPair) -> Result<FundingInfo, FetchError> {
        self.funding_fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .funding
            .lock()
            .get_mut(trading_pair)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(funding_info(trading_pair)))
    }
}
