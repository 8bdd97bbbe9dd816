mod book;
mod funding;
mod side;
mod trade;

pub use book::{BookDiff, BookLevel, BookSnapshot, OrderBookEvent, OrderBookEventKind};
pub use funding::{FundingEvent, FundingInfo, FundingInfoUpdate};
pub use side::TradeSide;
pub use trade::TradeEvent;
