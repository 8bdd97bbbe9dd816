use serde::{Deserialize, Serialize};

/// Aggressor side of a public trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }

    /// Side from a "buyer is maker" flag: a maker buyer means the taker sold.
    pub fn from_buyer_maker(buyer_is_maker: bool) -> Self {
        if buyer_is_maker {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        }
    }
}
