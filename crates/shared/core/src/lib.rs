//! Tributary Core Domain
//!
//! Pure market-data types shared by every exchange connector:
//! - Identifiers: exchanges, trading pairs, exchange symbol maps
//! - Normalized events: book snapshots, diffs, trades, funding records
//! - The snapshot/diff sequencing contract and a reference book mirror
//!
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod markets;
pub mod sync;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    BookDiff, BookLevel, BookSnapshot, FundingEvent, FundingInfo, FundingInfoUpdate,
    OrderBookEvent, OrderBookEventKind, TradeEvent, TradeSide,
};
pub use markets::{ExchangeId, PairError, SymbolMap, TradingPair};
pub use sync::{BookMirror, DiffVerdict, PairBook, SequenceTracker, SyncStatus};
pub use values::{Price, Size, Timestamp, UpdateId};
