//! Tributary Gateway
//!
//! Market-data ingestion runtime. For each exchange it keeps one websocket
//! session alive, fans inbound messages out to per-channel consumers and
//! delivers normalized events to caller-supplied queues:
//! - Listener lifecycle with fixed-delay reconnects and idle keepalives
//! - Channel router over bounded queues
//! - Snapshot refresher as the order book correctness backstop
//! - Funding feed for perpetual connectors
//!
//! ## Architecture
//!
//! ```text
//! Exchange (WS + REST)
//!         │
//!    ┌────▼─────┐
//!    │Connector │  classify / parse / fetch
//!    └────┬─────┘
//!         │ Channels:
//!         │ snapshot, diff, trade, funding
//!    ┌────▼─────┐
//!    │  Sink    │  order book, trades, funding
//!    └──────────┘
//! ```
//!
//! Everything exchange-specific sits behind the `Connector` and
//! `PerpetualConnector` traits; the runtime never names a venue.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types
pub use application::{
    DataSourceHandle, DataSourceSettings, FundingTracker, MarketDataSource, spawn_enabled,
};
pub use config::{ConfigError, FeedsConfig, load_config, load_default_config};
pub use domain::{
    ChannelKey, Connector, ControlFrame, ListenerState, PerpetualConnector, RawMessage, WsConnector,
    WsRequest,
};
pub use error::{ConnectionError, FetchError, GatewayError, ParseError, TransportError};
pub use infrastructure::{TungsteniteConnector, connector_for};
pub use presentation::{MarketDataSink, MarketDataStreams};
