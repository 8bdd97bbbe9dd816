use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tributary_core::{BookSnapshot, FundingInfo, FundingInfoUpdate, OrderBookEvent, TradingPair};

use super::{ChannelKey, ControlFrame, RawMessage, WsFrame, WsRequest};
use crate::error::{ConnectionError, FetchError, ParseError, TransportError};

// =============================================================================
// Transport ports
// =============================================================================

/// Opens physical websocket connections
#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsConnection>, ConnectionError>;
}

/// One open duplex connection. Single reader, single writer.
#[async_trait]
pub trait WsConnection: Send {
    async fn send(&mut self, frame: WsFrame) -> Result<(), TransportError>;

    /// Next frame, or `None` once the stream has ended
    async fn recv(&mut self) -> Option<Result<WsFrame, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Outbound hook run before a request is written (envelopes, ids, signing)
pub trait WsPreProcessor: Send + Sync {
    fn pre_process(&self, request: WsRequest) -> Result<WsRequest, TransportError>;
}

/// Inbound hook run on every received message (decoding, unwrapping)
pub trait WsPostProcessor: Send + Sync {
    fn post_process(&self, message: RawMessage) -> Result<RawMessage, TransportError>;
}

// =============================================================================
// Connector capability interface
// =============================================================================

/// Everything exchange-specific about a market-data feed.
///
/// The runtime only ever talks to this trait: it asks the connector what to
/// subscribe to, which channel a message belongs to, how to turn it into
/// domain events and how to fetch REST snapshots.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    /// Channels pushed over the websocket; one queue is created per entry
    fn channels(&self) -> Vec<ChannelKey>;

    /// One request per required channel, sent in order after connecting
    fn subscribe_requests(&self, trading_pairs: &[TradingPair]) -> Vec<WsRequest>;

    /// Total and non-blocking; `Unknown` is a valid answer
    fn classify(&self, message: &RawMessage) -> ChannelKey;

    /// Sent whenever the connection has been idle for the keepalive interval
    fn keepalive_request(&self) -> WsRequest {
        WsRequest::Ping(Vec::new())
    }

    fn control_frame(&self, _message: &RawMessage) -> Option<ControlFrame> {
        None
    }

    /// Fresh chain per session
    fn pre_processors(&self) -> Vec<Arc<dyn WsPreProcessor>> {
        Vec::new()
    }

    fn post_processors(&self) -> Vec<Arc<dyn WsPostProcessor>> {
        Vec::new()
    }

    fn parse_snapshot(&self, _message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        Err(ParseError::Unsupported {
            channel: ChannelKey::Snapshot,
        })
    }

    fn parse_diff(&self, _message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        Err(ParseError::Unsupported {
            channel: ChannelKey::Diff,
        })
    }

    fn parse_trade(&self, _message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        Err(ParseError::Unsupported {
            channel: ChannelKey::Trade,
        })
    }

    /// Full book over REST
    async fn fetch_snapshot(&self, trading_pair: &TradingPair) -> Result<BookSnapshot, FetchError>;

    async fn fetch_last_traded_prices(
        &self,
        _trading_pairs: &[TradingPair],
    ) -> Result<HashMap<TradingPair, Decimal>, FetchError> {
        Err(FetchError::Unsupported("last traded prices"))
    }
}

/// Perpetual-futures extension: funding rate feed
#[async_trait]
pub trait PerpetualConnector: Connector {
    /// Only the fields present in the message are set on each update
    fn parse_funding(&self, _message: &RawMessage) -> Result<Vec<FundingInfoUpdate>, ParseError> {
        Err(ParseError::Unsupported {
            channel: ChannelKey::Funding,
        })
    }

    /// Full funding state, composed from as many REST calls as the venue needs
    async fn fetch_funding_info(&self, trading_pair: &TradingPair) -> Result<FundingInfo, FetchError>;
}
