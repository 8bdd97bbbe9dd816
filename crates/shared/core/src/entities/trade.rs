use serde::{Deserialize, Serialize};

use super::TradeSide;
use crate::markets::TradingPair;
use crate::values::{Price, Size, Timestamp, UpdateId};

/// Public trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trading_pair: TradingPair,
    /// Exchange trade id, kept verbatim (some venues use UUIDs)
    pub trade_id: String,
    /// Monotonic per pair; the trade id when numeric, otherwise the trade time in ms
    pub update_id: UpdateId,
    pub side: TradeSide,
    pub price: Price,
    pub size: Size,
    pub timestamp: Timestamp,
}
