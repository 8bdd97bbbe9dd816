mod exchange;
mod pair;
mod symbol_map;

pub use exchange::ExchangeId;
pub use pair::{PairError, TradingPair};
pub use symbol_map::SymbolMap;
