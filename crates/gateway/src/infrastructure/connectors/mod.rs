//! Concrete exchange connectors and the JSON field helpers they share

mod binance_perpetual;
mod bybit_perpetual;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tributary_core::{BookLevel, SymbolMap, TradingPair};

pub use binance_perpetual::BinancePerpetualConnector;
pub use bybit_perpetual::BybitPerpetualConnector;

use super::RestClient;
use crate::config::{ConnectorKind, ExchangeConfig};
use crate::domain::{PerpetualConnector, RawMessage};
use crate::error::ParseError;

/// Build the connector an exchange entry asks for
pub fn connector_for(exchange: &ExchangeConfig) -> Arc<dyn PerpetualConnector> {
    let rest = RestClient::new(
        exchange.rest_url.clone(),
        exchange.rate_limits.max_concurrent_requests,
        exchange.rate_limits.request_timeout(),
    );
    match exchange.connector {
        ConnectorKind::BinancePerpetual => Arc::new(BinancePerpetualConnector::new(
            &exchange.trading_pairs,
            rest,
            exchange.market_data.snapshot_depth,
        )),
        ConnectorKind::BybitPerpetual => Arc::new(BybitPerpetualConnector::new(
            &exchange.trading_pairs,
            rest,
            exchange.market_data.snapshot_depth,
            exchange.market_data.stream_depth,
        )),
    }
}

fn json_payload(message: &RawMessage) -> Result<&Value, ParseError> {
    message.as_json().ok_or(ParseError::NotJson)
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value, ParseError> {
    value.get(name).ok_or_else(|| ParseError::missing(name))
}

fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, ParseError> {
    let raw = field(value, name)?;
    raw.as_str().ok_or_else(|| ParseError::invalid(name, raw))
}

fn u64_field(value: &Value, name: &str) -> Result<u64, ParseError> {
    let raw = field(value, name)?;
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| ParseError::invalid(name, raw))
}

fn decimal_field(value: &Value, name: &str) -> Result<Decimal, ParseError> {
    let raw = str_field(value, name)?;
    raw.parse().map_err(|_| ParseError::invalid(name, raw))
}

/// `None` when the field is absent; a present but unreadable field is an error
fn optional_decimal(value: &Value, name: &str) -> Result<Option<Decimal>, ParseError> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => decimal_field(value, name).map(Some),
    }
}

fn optional_u64(value: &Value, name: &str) -> Result<Option<u64>, ParseError> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => u64_field(value, name).map(Some),
    }
}

/// `[["price", "size"], ...]` level arrays
fn parse_levels(value: &Value, name: &str) -> Result<Vec<BookLevel>, ParseError> {
    let raw = field(value, name)?;
    let entries = raw.as_array().ok_or_else(|| ParseError::invalid(name, raw))?;
    entries
        .iter()
        .map(|entry| {
            let price = entry.get(0).and_then(|p| p.as_str());
            let size = entry.get(1).and_then(|s| s.as_str());
            match (price, size) {
                (Some(p), Some(s)) => match (p.parse(), s.parse()) {
                    (Ok(price), Ok(size)) => Ok(BookLevel::new(price, size)),
                    _ => Err(ParseError::invalid(name, entry)),
                },
                _ => Err(ParseError::invalid(name, entry)),
            }
        })
        .collect()
}

fn pair_for<'a>(symbols: &'a SymbolMap, symbol: &str) -> Result<&'a TradingPair, ParseError> {
    symbols
        .pair(symbol)
        .ok_or_else(|| ParseError::UnknownSymbol(symbol.to_string()))
}

fn timestamp_ms(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}
