use serde::{Deserialize, Serialize};

use crate::markets::TradingPair;
use crate::values::Price;
use rust_decimal::Decimal;

/// Full funding state of a perpetual contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingInfo {
    pub trading_pair: TradingPair,
    pub index_price: Price,
    pub mark_price: Price,
    /// Seconds since the UNIX epoch
    pub next_funding_utc_timestamp: i64,
    pub rate: Decimal,
}

/// Changed funding fields for one pair.
///
/// A `None` field means "unchanged", never "cleared".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingInfoUpdate {
    pub trading_pair: TradingPair,
    pub index_price: Option<Price>,
    pub mark_price: Option<Price>,
    pub next_funding_utc_timestamp: Option<i64>,
    pub rate: Option<Decimal>,
}

impl FundingInfoUpdate {
    pub fn new(trading_pair: TradingPair) -> Self {
        Self {
            trading_pair,
            index_price: None,
            mark_price: None,
            next_funding_utc_timestamp: None,
            rate: None,
        }
    }

    pub fn with_index_price(mut self, price: Price) -> Self {
        self.index_price = Some(price);
        self
    }

    pub fn with_mark_price(mut self, price: Price) -> Self {
        self.mark_price = Some(price);
        self
    }

    pub fn with_next_funding(mut self, utc_timestamp: i64) -> Self {
        self.next_funding_utc_timestamp = Some(utc_timestamp);
        self
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.index_price.is_none()
            && self.mark_price.is_none()
            && self.next_funding_utc_timestamp.is_none()
            && self.rate.is_none()
    }
}

impl From<&FundingInfo> for FundingInfoUpdate {
    fn from(info: &FundingInfo) -> Self {
        FundingInfoUpdate {
            trading_pair: info.trading_pair.clone(),
            index_price: Some(info.index_price),
            mark_price: Some(info.mark_price),
            next_funding_utc_timestamp: Some(info.next_funding_utc_timestamp),
            rate: Some(info.rate),
        }
    }
}

impl FundingInfo {
    /// Merge the present fields of `update`. Returns false (and changes
    /// nothing) when the update belongs to another pair.
    pub fn apply(&mut self, update: &FundingInfoUpdate) -> bool {
        if update.trading_pair != self.trading_pair {
            return false;
        }
        if let Some(index_price) = update.index_price {
            self.index_price = index_price;
        }
        if let Some(mark_price) = update.mark_price {
            self.mark_price = mark_price;
        }
        if let Some(next_funding) = update.next_funding_utc_timestamp {
            self.next_funding_utc_timestamp = next_funding;
        }
        if let Some(rate) = update.rate {
            self.rate = rate;
        }
        true
    }
}

/// Item of the funding output stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FundingEvent {
    /// Bootstrap state, emitted once per pair before any update
    Info(FundingInfo),
    Update(FundingInfoUpdate),
}

impl FundingEvent {
    pub fn trading_pair(&self) -> &TradingPair {
        match self {
            FundingEvent::Info(info) => &info.trading_pair,
            FundingEvent::Update(update) => &update.trading_pair,
        }
    }
}
