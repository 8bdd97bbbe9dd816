//! Error types for the gateway crate
//!
//! Each layer gets its own enum so callers can tell session-fatal faults
//! (connection, transport) from per-message and per-request ones (parse, fetch).

use std::time::Duration;

use thiserror::Error;
use tributary_core::TradingPair;

use crate::config::ConfigError;
use crate::domain::ChannelKey;

/// Opening a websocket failed; the session never came up
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid websocket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },

    #[error("Connecting to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

/// Send/receive failure on an established session
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Nothing received for {0:?}")]
    ResponseTimeout(Duration),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Processor rejected message: {0}")]
    Processor(String),
}

/// A single inbound message could not be turned into domain events
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{channel} messages are not handled by this connector")]
    Unsupported { channel: ChannelKey },

    #[error("Payload is not a JSON document")]
    NotJson,

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Invalid value for '{field}': {value}")]
    InvalidField { field: String, value: String },

    #[error("Unknown exchange symbol '{0}'")]
    UnknownSymbol(String),
}

impl ParseError {
    pub fn missing(field: impl Into<String>) -> Self {
        ParseError::MissingField(field.into())
    }

    pub fn invalid(field: impl Into<String>, value: impl ToString) -> Self {
        ParseError::InvalidField {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

/// A single REST request failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No exchange symbol for {0}")]
    UnknownPair(TradingPair),

    #[error("{0} is not supported by this connector")]
    Unsupported(&'static str),
}

impl From<ParseError> for FetchError {
    fn from(err: ParseError) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// Why a listener session ended, tagged with the operation that failed
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectionError),

    #[error("subscribe failed: {0}")]
    Subscribe(#[source] TransportError),

    #[error("receive failed: {0}")]
    Receive(#[source] TransportError),

    #[error("keepalive failed: {0}")]
    Keepalive(#[source] TransportError),
}

impl ListenerError {
    /// Operation name used in log context
    pub fn operation(&self) -> &'static str {
        match self {
            ListenerError::Connect(_) => "connect",
            ListenerError::Subscribe(_) => "subscribe",
            ListenerError::Receive(_) => "receive",
            ListenerError::Keepalive(_) => "keepalive",
        }
    }
}

/// Gateway-level errors (setup and orchestration)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}
