use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Logical stream a raw inbound message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKey {
    Snapshot,
    Diff,
    Trade,
    Funding,
    Unknown,
}

impl ChannelKey {
    pub const ALL: [ChannelKey; 5] = [
        ChannelKey::Snapshot,
        ChannelKey::Diff,
        ChannelKey::Trade,
        ChannelKey::Funding,
        ChannelKey::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKey::Snapshot => "snapshot",
            ChannelKey::Diff => "diff",
            ChannelKey::Trade => "trade",
            ChannelKey::Funding => "funding",
            ChannelKey::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound payload as it came off the wire, possibly decoded by post-processors
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

/// One inbound frame plus its arrival time. Never mutated after enqueueing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn json(value: Value) -> Self {
        Self::new(Payload::Json(value))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Outbound request, opaque to the session
#[derive(Debug, Clone, PartialEq)]
pub enum WsRequest {
    Json(Value),
    Text(String),
    /// Protocol-level ping frame
    Ping(Vec<u8>),
}

impl WsRequest {
    pub fn into_frame(self) -> Result<WsFrame, TransportError> {
        Ok(match self {
            WsRequest::Json(value) => WsFrame::Text(serde_json::to_string(&value)?),
            WsRequest::Text(text) => WsFrame::Text(text),
            WsRequest::Ping(data) => WsFrame::Ping(data),
        })
    }
}

/// Frame as exchanged with the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Connection-management messages recognised by a connector.
/// These are handled by the listener and never routed to a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    /// Peer expects this reply (application-level ping)
    Reply(WsRequest),
    /// Answer to our keepalive
    KeepaliveAck,
    SubscriptionAck { success: bool, detail: String },
}
