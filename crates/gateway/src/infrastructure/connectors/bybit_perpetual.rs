//! Bybit v5 public linear (USDT perpetual) streams.
//!
//! The order book topic pushes a full snapshot on subscribe and deltas
//! afterwards, so it feeds both the snapshot and the diff channel. Tickers
//! deltas only carry the fields that changed. Their `lastPrice` is kept
//! so last-traded-price lookups rarely need REST.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tributary_core::{
    BookDiff, BookSnapshot, FundingInfo, FundingInfoUpdate, OrderBookEvent, SymbolMap,
    TradeEvent, TradeSide, TradingPair,
};

use super::{
    decimal_field, field, json_payload, optional_decimal, optional_u64, pair_for, parse_levels,
    str_field, timestamp_ms, u64_field,
};
use crate::domain::{
    ChannelKey, Connector, ControlFrame, PerpetualConnector, RawMessage, WsPostProcessor,
    WsPreProcessor, WsRequest,
};
use crate::error::{FetchError, ParseError};
use crate::infrastructure::RestClient;
use crate::infrastructure::processors::{JsonDecoder, RequestIdStamper};

const ORDERBOOK_TOPIC: &str = "orderbook";
const TRADE_TOPIC: &str = "publicTrade";
const TICKERS_TOPIC: &str = "tickers";

const ORDERBOOK_ENDPOINT: &str = "/v5/market/orderbook";
const TICKERS_ENDPOINT: &str = "/v5/market/tickers";
const CATEGORY: &str = "linear";

pub struct BybitPerpetualConnector {
    symbols: Arc<SymbolMap>,
    rest: RestClient,
    snapshot_limit: u32,
    stream_depth: u32,
    last_prices: DashMap<TradingPair, Decimal>,
}

impl BybitPerpetualConnector {
    pub fn new(
        trading_pairs: &[TradingPair],
        rest: RestClient,
        snapshot_limit: u32,
        stream_depth: u32,
    ) -> Self {
        BybitPerpetualConnector {
            symbols: Arc::new(SymbolMap::from_pairs(trading_pairs, Self::exchange_symbol)),
            rest,
            snapshot_limit,
            stream_depth,
            last_prices: DashMap::new(),
        }
    }

    /// `BTC-USDT` -> `BTCUSDT`
    pub fn exchange_symbol(pair: &TradingPair) -> String {
        format!("{}{}", pair.base(), pair.quote())
    }

    fn symbol(&self, pair: &TradingPair) -> Result<&str, FetchError> {
        self.symbols
            .symbol(pair)
            .ok_or_else(|| FetchError::UnknownPair(pair.clone()))
    }

    fn topics(&self, trading_pairs: &[TradingPair], prefix: &str) -> Vec<String> {
        trading_pairs
            .iter()
            .filter_map(|pair| self.symbols.symbol(pair))
            .map(|symbol| format!("{}.{}", prefix, symbol))
            .collect()
    }

    /// Trailing topic segment is the symbol
    fn topic_pair(&self, payload: &Value) -> Result<&TradingPair, ParseError> {
        let topic = str_field(payload, "topic")?;
        let symbol = topic.rsplit('.').next().unwrap_or(topic);
        pair_for(&self.symbols, symbol)
    }

    /// Returns the pair, the envelope and its `data` object
    fn parse_book<'a>(
        &self,
        message: &'a RawMessage,
    ) -> Result<(TradingPair, &'a Value, &'a Value), ParseError> {
        let payload = json_payload(message)?;
        let pair = self.topic_pair(payload)?.clone();
        Ok((pair, payload, field(payload, "data")?))
    }

    /// REST envelope: `{"retCode": 0, "retMsg": "OK", "result": {...}}`
    fn result<'a>(body: &'a Value) -> Result<&'a Value, FetchError> {
        let code = body.get("retCode").and_then(|c| c.as_i64()).unwrap_or(0);
        if code != 0 {
            let message = body
                .get("retMsg")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(FetchError::Api { code, message });
        }
        Ok(field(body, "result")?)
    }

    fn first_ticker(result: &Value) -> Result<&Value, ParseError> {
        field(result, "list")?
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ParseError::missing("list[0]"))
    }

    fn parse_rest_snapshot(&self, pair: &TradingPair, result: &Value) -> Result<BookSnapshot, ParseError> {
        Ok(BookSnapshot {
            trading_pair: pair.clone(),
            update_id: u64_field(result, "u")?,
            bids: parse_levels(result, "b")?,
            asks: parse_levels(result, "a")?,
            timestamp: timestamp_ms(u64_field(result, "ts")?),
        })
    }

    fn parse_ticker(&self, pair: &TradingPair, ticker: &Value) -> Result<FundingInfo, ParseError> {
        Ok(FundingInfo {
            trading_pair: pair.clone(),
            index_price: decimal_field(ticker, "indexPrice")?,
            mark_price: decimal_field(ticker, "markPrice")?,
            next_funding_utc_timestamp: (u64_field(ticker, "nextFundingTime")? / 1000) as i64,
            rate: decimal_field(ticker, "fundingRate")?,
        })
    }
}

#[async_trait]
impl Connector for BybitPerpetualConnector {
    fn name(&self) -> &str {
        "bybit_perpetual"
    }

    fn channels(&self) -> Vec<ChannelKey> {
        vec![
            ChannelKey::Snapshot,
            ChannelKey::Diff,
            ChannelKey::Trade,
            ChannelKey::Funding,
        ]
    }

    fn subscribe_requests(&self, trading_pairs: &[TradingPair]) -> Vec<WsRequest> {
        let book_prefix = format!("{}.{}", ORDERBOOK_TOPIC, self.stream_depth);
        [book_prefix.as_str(), TRADE_TOPIC, TICKERS_TOPIC]
            .into_iter()
            .map(|prefix| {
                WsRequest::Json(json!({"op": "subscribe", "args": self.topics(trading_pairs, prefix)}))
            })
            .collect()
    }

    fn classify(&self, message: &RawMessage) -> ChannelKey {
        let Some(payload) = message.as_json() else {
            return ChannelKey::Unknown;
        };
        let Some(topic) = payload.get("topic").and_then(|t| t.as_str()) else {
            return ChannelKey::Unknown;
        };
        let prefix = topic.split('.').next().unwrap_or_default();
        match prefix {
            ORDERBOOK_TOPIC => match payload.get("type").and_then(|t| t.as_str()) {
                Some("snapshot") => ChannelKey::Snapshot,
                Some("delta") => ChannelKey::Diff,
                _ => ChannelKey::Unknown,
            },
            TRADE_TOPIC => ChannelKey::Trade,
            TICKERS_TOPIC => ChannelKey::Funding,
            _ => ChannelKey::Unknown,
        }
    }

    fn keepalive_request(&self) -> WsRequest {
        WsRequest::Json(json!({"op": "ping"}))
    }

    fn control_frame(&self, message: &RawMessage) -> Option<ControlFrame> {
        let payload = message.as_json()?;
        let op = payload.get("op")?.as_str()?;
        let success = payload.get("success").and_then(|s| s.as_bool()).unwrap_or(true);
        let detail = payload
            .get("ret_msg")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        match op {
            "ping" | "pong" => Some(ControlFrame::KeepaliveAck),
            "subscribe" => Some(ControlFrame::SubscriptionAck { success, detail }),
            _ => None,
        }
    }

    fn pre_processors(&self) -> Vec<Arc<dyn WsPreProcessor>> {
        vec![Arc::new(RequestIdStamper::string("req_id"))]
    }

    fn post_processors(&self) -> Vec<Arc<dyn WsPostProcessor>> {
        vec![Arc::new(JsonDecoder)]
    }

    fn parse_snapshot(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let (trading_pair, payload, data) = self.parse_book(message)?;
        Ok(vec![OrderBookEvent::Snapshot(BookSnapshot {
            trading_pair,
            update_id: u64_field(data, "u")?,
            bids: parse_levels(data, "b")?,
            asks: parse_levels(data, "a")?,
            timestamp: timestamp_ms(u64_field(payload, "ts")?),
        })])
    }

    fn parse_diff(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let (trading_pair, payload, data) = self.parse_book(message)?;
        let update_id = u64_field(data, "u")?;
        Ok(vec![OrderBookEvent::Diff(BookDiff {
            trading_pair,
            first_update_id: update_id,
            update_id,
            bids: parse_levels(data, "b")?,
            asks: parse_levels(data, "a")?,
            timestamp: timestamp_ms(u64_field(payload, "ts")?),
        })])
    }

    fn parse_trade(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let payload = json_payload(message)?;
        let trading_pair = self.topic_pair(payload)?;
        let trades = field(payload, "data")?
            .as_array()
            .ok_or_else(|| ParseError::invalid("data", "not a list"))?;

        trades
            .iter()
            .map(|trade| {
                let side = match str_field(trade, "S")? {
                    "Buy" => TradeSide::Buy,
                    "Sell" => TradeSide::Sell,
                    other => return Err(ParseError::invalid("S", other)),
                };
                let time = u64_field(trade, "T")?;
                Ok(OrderBookEvent::Trade(TradeEvent {
                    trading_pair: trading_pair.clone(),
                    trade_id: str_field(trade, "i")?.to_string(),
                    update_id: time,
                    side,
                    price: decimal_field(trade, "p")?,
                    size: decimal_field(trade, "v")?,
                    timestamp: timestamp_ms(time),
                }))
            })
            .collect()
    }

    async fn fetch_snapshot(&self, trading_pair: &TradingPair) -> Result<BookSnapshot, FetchError> {
        let query = [
            ("category", CATEGORY.to_string()),
            ("symbol", self.symbol(trading_pair)?.to_string()),
            ("limit", self.snapshot_limit.to_string()),
        ];
        let body: Value = self.rest.get(ORDERBOOK_ENDPOINT, &query).await?;
        Ok(self.parse_rest_snapshot(trading_pair, Self::result(&body)?)?)
    }

    async fn fetch_last_traded_prices(
        &self,
        trading_pairs: &[TradingPair],
    ) -> Result<HashMap<TradingPair, Decimal>, FetchError> {
        let mut prices: HashMap<TradingPair, Decimal> = trading_pairs
            .iter()
            .filter_map(|pair| self.last_prices.get(pair).map(|price| (pair.clone(), *price)))
            .collect();
        if prices.len() == trading_pairs.len() {
            return Ok(prices);
        }

        let query = [("category", CATEGORY.to_string())];
        let body: Value = self.rest.get(TICKERS_ENDPOINT, &query).await?;
        let list = field(Self::result(&body)?, "list")?
            .as_array()
            .ok_or_else(|| FetchError::Parse("tickers list is not an array".into()))?;

        for ticker in list {
            let Some(pair) = ticker
                .get("symbol")
                .and_then(|s| s.as_str())
                .and_then(|s| self.symbols.pair(s))
            else {
                continue;
            };
            if trading_pairs.contains(pair) && !prices.contains_key(pair) {
                prices.insert(pair.clone(), decimal_field(ticker, "lastPrice")?);
            }
        }
        Ok(prices)
    }
}

#[async_trait]
impl PerpetualConnector for BybitPerpetualConnector {
    fn parse_funding(&self, message: &RawMessage) -> Result<Vec<FundingInfoUpdate>, ParseError> {
        let payload = json_payload(message)?;
        let data = field(payload, "data")?;
        let pair = pair_for(&self.symbols, str_field(data, "symbol")?)?;
        if let Some(price) = optional_decimal(data, "lastPrice")? {
            self.last_prices.insert(pair.clone(), price);
        }

        let mut update = FundingInfoUpdate::new(pair.clone());
        update.index_price = optional_decimal(data, "indexPrice")?;
        update.mark_price = optional_decimal(data, "markPrice")?;
        update.rate = optional_decimal(data, "fundingRate")?;
        update.next_funding_utc_timestamp =
            optional_u64(data, "nextFundingTime")?.map(|ms| (ms / 1000) as i64);
        Ok(vec![update])
    }

    async fn fetch_funding_info(&self, trading_pair: &TradingPair) -> Result<FundingInfo, FetchError> {
        let query = [
            ("category", CATEGORY.to_string()),
            ("symbol", self.symbol(trading_pair)?.to_string()),
        ];
        let body: Value = self.rest.get(TICKERS_ENDPOINT, &query).await?;
        let ticker = Self::first_ticker(Self::result(&body)?)?;
        Ok(self.parse_ticker(trading_pair, ticker)?)
    }
}
