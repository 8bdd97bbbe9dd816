//! Infrastructure Layer - inbound adapters (exchanges -> gateway)
//!
//! - `WsSession` over a pluggable `WsConnector` (tungstenite in production)
//! - `RestClient` with per-endpoint throttling
//! - Exchange connectors implementing the domain `Connector` ports

pub mod connectors;
pub mod processors;
mod rest_client;
mod session;
mod ws_transport;

pub use connectors::{BinancePerpetualConnector, BybitPerpetualConnector, connector_for};
pub use processors::{JsonDecoder, RequestIdStamper};
pub use rest_client::{EndpointThrottle, RestClient, RestError};
pub use session::WsSession;
pub use ws_transport::TungsteniteConnector;
