use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairError {
    #[error("trading pair '{0}' is not in BASE-QUOTE form")]
    Malformed(String),
}

/// Base/quote market identifier such as `BTC-USDT`.
///
/// Primary key for all per-market state. Always uppercase with a single `-`
/// between base and quote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair(String);

impl TradingPair {
    pub fn new(base: &str, quote: &str) -> Self {
        TradingPair(format!(
            "{}-{}",
            base.to_uppercase(),
            quote.to_uppercase()
        ))
    }

    pub fn parse(s: &str) -> Result<Self, PairError> {
        match s.split_once('-') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('-') =>
            {
                Ok(TradingPair::new(base, quote))
            }
            _ => Err(PairError::Malformed(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.0.split_once('-').map(|(b, _)| b).unwrap_or(&self.0)
    }

    pub fn quote(&self) -> &str {
        self.0.split_once('-').map(|(_, q)| q).unwrap_or("")
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TradingPair {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradingPair::parse(s)
    }
}

impl TryFrom<String> for TradingPair {
    type Error = PairError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        TradingPair::parse(&s)
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> Self {
        pair.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let pair = TradingPair::parse("btc-usdt").unwrap();
        assert_eq!(pair.as_str(), "BTC-USDT");
        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.quote(), "USDT");
        assert_eq!(pair, TradingPair::new("BTC", "usdt"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TradingPair::parse("BTCUSDT").is_err());
        assert!(TradingPair::parse("-USDT").is_err());
        assert!(TradingPair::parse("BTC-").is_err());
        assert!(TradingPair::parse("A-B-C").is_err());
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let pair: TradingPair = serde_json::from_str("\"eth-usdt\"").unwrap();
        assert_eq!(pair.to_string(), "ETH-USDT");
        assert!(serde_json::from_str::<TradingPair>("\"ETHUSDT\"").is_err());
    }
}
