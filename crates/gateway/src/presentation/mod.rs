//! Presentation Layer - delivery of normalized events to the caller

mod sink;

pub use sink::{MarketDataSink, MarketDataStreams, SinkError};
