//! Domain Layer - gateway-internal messages, states and ports
//!
//! No I/O lives here. Infrastructure implements the ports
//! (`WsConnector`, `Connector`), application code depends only on them.

mod messages;
mod state;
mod traits;

pub use messages::{ChannelKey, ControlFrame, Payload, RawMessage, WsFrame, WsRequest};
pub use state::ListenerState;
pub use traits::{Connector, PerpetualConnector, WsConnection, WsConnector, WsPostProcessor, WsPreProcessor};
