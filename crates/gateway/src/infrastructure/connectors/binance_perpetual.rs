//! Binance USD-M futures, combined-stream endpoint (`/stream`).
//!
//! Frames arrive as `{"stream": "btcusdt@depth@100ms", "data": {...}}`.
//! Futures diffs are not id-contiguous on `U`; each carries `pu`, the final
//! id of the previous diff, so the applicable range starts at `pu + 1`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
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

const DEPTH_STREAM: &str = "depth@100ms";
const TRADE_STREAM: &str = "aggTrade";
const FUNDING_STREAM: &str = "markPrice@1s";

const DEPTH_ENDPOINT: &str = "/fapi/v1/depth";
const PREMIUM_INDEX_ENDPOINT: &str = "/fapi/v1/premiumIndex";
const TICKER_PRICE_ENDPOINT: &str = "/fapi/v1/ticker/price";

pub struct BinancePerpetualConnector {
    symbols: Arc<SymbolMap>,
    rest: RestClient,
    depth_limit: u32,
}

impl BinancePerpetualConnector {
    pub fn new(trading_pairs: &[TradingPair], rest: RestClient, depth_limit: u32) -> Self {
        BinancePerpetualConnector {
            symbols: Arc::new(SymbolMap::from_pairs(trading_pairs, Self::exchange_symbol)),
            rest,
            depth_limit,
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

    fn subscribe(&self, trading_pairs: &[TradingPair], stream: &str) -> WsRequest {
        let params: Vec<String> = trading_pairs
            .iter()
            .filter_map(|pair| self.symbols.symbol(pair))
            .map(|symbol| format!("{}@{}", symbol.to_lowercase(), stream))
            .collect();
        WsRequest::Json(json!({"method": "SUBSCRIBE", "params": params}))
    }

    fn stream_data<'a>(&self, message: &'a RawMessage) -> Result<&'a Value, ParseError> {
        field(json_payload(message)?, "data")
    }

    fn parse_depth_snapshot(&self, pair: &TradingPair, body: &Value) -> Result<BookSnapshot, ParseError> {
        let event_time = optional_u64(body, "E")?;
        Ok(BookSnapshot {
            trading_pair: pair.clone(),
            update_id: u64_field(body, "lastUpdateId")?,
            bids: parse_levels(body, "bids")?,
            asks: parse_levels(body, "asks")?,
            timestamp: event_time.map(timestamp_ms).unwrap_or_else(chrono::Utc::now),
        })
    }

    fn parse_premium_index(&self, pair: &TradingPair, body: &Value) -> Result<FundingInfo, ParseError> {
        Ok(FundingInfo {
            trading_pair: pair.clone(),
            index_price: decimal_field(body, "indexPrice")?,
            mark_price: decimal_field(body, "markPrice")?,
            next_funding_utc_timestamp: (u64_field(body, "nextFundingTime")? / 1000) as i64,
            rate: decimal_field(body, "lastFundingRate")?,
        })
    }
}

#[async_trait]
impl Connector for BinancePerpetualConnector {
    fn name(&self) -> &str {
        "binance_perpetual"
    }

    fn channels(&self) -> Vec<ChannelKey> {
        vec![ChannelKey::Diff, ChannelKey::Trade, ChannelKey::Funding]
    }

    fn subscribe_requests(&self, trading_pairs: &[TradingPair]) -> Vec<WsRequest> {
        vec![
            self.subscribe(trading_pairs, DEPTH_STREAM),
            self.subscribe(trading_pairs, TRADE_STREAM),
            self.subscribe(trading_pairs, FUNDING_STREAM),
        ]
    }

    fn classify(&self, message: &RawMessage) -> ChannelKey {
        let Some(stream) = message
            .as_json()
            .and_then(|v| v.get("stream"))
            .and_then(|s| s.as_str())
        else {
            return ChannelKey::Unknown;
        };
        match stream.split_once('@').map(|(_, kind)| kind) {
            Some(kind) if kind.starts_with("depth") => ChannelKey::Diff,
            Some(kind) if kind.starts_with(TRADE_STREAM) => ChannelKey::Trade,
            Some(kind) if kind.starts_with("markPrice") => ChannelKey::Funding,
            _ => ChannelKey::Unknown,
        }
    }

    fn control_frame(&self, message: &RawMessage) -> Option<ControlFrame> {
        let value = message.as_json()?;
        let id = value.get("id")?;
        if let Some(error) = value.get("error") {
            return Some(ControlFrame::SubscriptionAck {
                success: false,
                detail: format!("request {}: {}", id, error),
            });
        }
        value.get("result").map(|_| ControlFrame::SubscriptionAck {
            success: true,
            detail: format!("request {}", id),
        })
    }

    fn pre_processors(&self) -> Vec<Arc<dyn WsPreProcessor>> {
        vec![Arc::new(RequestIdStamper::numeric("id"))]
    }

    fn post_processors(&self) -> Vec<Arc<dyn WsPostProcessor>> {
        vec![Arc::new(JsonDecoder)]
    }

    fn parse_diff(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let data = self.stream_data(message)?;
        let pair = pair_for(&self.symbols, str_field(data, "s")?)?;
        let update_id = u64_field(data, "u")?;
        let first_update_id = match optional_u64(data, "pu")? {
            Some(previous) => previous + 1,
            None => u64_field(data, "U")?,
        };

        Ok(vec![OrderBookEvent::Diff(BookDiff {
            trading_pair: pair.clone(),
            first_update_id,
            update_id,
            bids: parse_levels(data, "b")?,
            asks: parse_levels(data, "a")?,
            timestamp: timestamp_ms(u64_field(data, "E")?),
        })])
    }

    fn parse_trade(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        let data = self.stream_data(message)?;
        let pair = pair_for(&self.symbols, str_field(data, "s")?)?;
        let trade_id = u64_field(data, "a")?;
        let buyer_is_maker = field(data, "m")?
            .as_bool()
            .ok_or_else(|| ParseError::invalid("m", &data["m"]))?;

        Ok(vec![OrderBookEvent::Trade(TradeEvent {
            trading_pair: pair.clone(),
            trade_id: trade_id.to_string(),
            update_id: trade_id,
            side: TradeSide::from_buyer_maker(buyer_is_maker),
            price: decimal_field(data, "p")?,
            size: decimal_field(data, "q")?,
            timestamp: timestamp_ms(u64_field(data, "T")?),
        })])
    }

    async fn fetch_snapshot(&self, trading_pair: &TradingPair) -> Result<BookSnapshot, FetchError> {
        let query = [
            ("symbol", self.symbol(trading_pair)?.to_string()),
            ("limit", self.depth_limit.to_string()),
        ];
        let body: Value = self.rest.get(DEPTH_ENDPOINT, &query).await?;
        Ok(self.parse_depth_snapshot(trading_pair, &body)?)
    }

    async fn fetch_last_traded_prices(
        &self,
        trading_pairs: &[TradingPair],
    ) -> Result<HashMap<TradingPair, Decimal>, FetchError> {
        let body: Value = self.rest.get(TICKER_PRICE_ENDPOINT, &[]).await?;
        let tickers = body
            .as_array()
            .ok_or_else(|| FetchError::Parse("ticker price response is not a list".into()))?;

        let mut prices = HashMap::new();
        for ticker in tickers {
            let Some(pair) = ticker
                .get("symbol")
                .and_then(|s| s.as_str())
                .and_then(|s| self.symbols.pair(s))
            else {
                continue;
            };
            if trading_pairs.contains(pair) {
                prices.insert(pair.clone(), decimal_field(ticker, "price")?);
            }
        }
        Ok(prices)
    }
}

#[async_trait]
impl PerpetualConnector for BinancePerpetualConnector {
    fn parse_funding(&self, message: &RawMessage) -> Result<Vec<FundingInfoUpdate>, ParseError> {
        let data = self.stream_data(message)?;
        let pair = pair_for(&self.symbols, str_field(data, "s")?)?;

        let mut update = FundingInfoUpdate::new(pair.clone());
        update.mark_price = optional_decimal(data, "p")?;
        update.index_price = optional_decimal(data, "i")?;
        update.rate = optional_decimal(data, "r")?;
        update.next_funding_utc_timestamp = optional_u64(data, "T")?.map(|ms| (ms / 1000) as i64);
        Ok(vec![update])
    }

    async fn fetch_funding_info(&self, trading_pair: &TradingPair) -> Result<FundingInfo, FetchError> {
        let query = [("symbol", self.symbol(trading_pair)?.to_string())];
        let body: Value = self.rest.get(PREMIUM_INDEX_ENDPOINT, &query).await?;
        Ok(self.parse_premium_index(trading_pair, &body)?)
    }
}
