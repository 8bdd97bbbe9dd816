use std::collections::HashMap;

use super::TradingPair;

/// Bidirectional mapping between exchange symbols and trading pairs.
///
/// Built once per data source from the configured pairs and shared read-only
/// (typically behind an `Arc`). There is no mutation after construction, so
/// connectors can hold it without locking.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    by_symbol: HashMap<String, TradingPair>,
    by_pair: HashMap<TradingPair, String>,
}

impl SymbolMap {
    /// Build from pairs using an exchange-specific symbol formatter.
    pub fn from_pairs<'a, I, F>(pairs: I, to_symbol: F) -> Self
    where
        I: IntoIterator<Item = &'a TradingPair>,
        F: Fn(&TradingPair) -> String,
    {
        let mut map = SymbolMap::default();
        for pair in pairs {
            let symbol = to_symbol(pair);
            map.by_symbol.insert(symbol.clone(), pair.clone());
            map.by_pair.insert(pair.clone(), symbol);
        }
        map
    }

    pub fn pair(&self, symbol: &str) -> Option<&TradingPair> {
        self.by_symbol.get(symbol)
    }

    pub fn symbol(&self, pair: &TradingPair) -> Option<&str> {
        self.by_pair.get(pair).map(String::as_str)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &TradingPair> {
        self.by_pair.keys()
    }

    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_directions() {
        let pairs = vec![
            TradingPair::new("BTC", "USDT"),
            TradingPair::new("ETH", "USDT"),
        ];
        let map = SymbolMap::from_pairs(&pairs, |p| format!("{}{}", p.base(), p.quote()));

        assert_eq!(map.len(), 2);
        assert_eq!(map.pair("BTCUSDT"), Some(&pairs[0]));
        assert_eq!(map.symbol(&pairs[1]), Some("ETHUSDT"));
        assert_eq!(map.pair("SOLUSDT"), None);
    }
}
