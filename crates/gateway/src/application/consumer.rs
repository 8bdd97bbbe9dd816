//! Per-channel consumers: dequeue, parse with the connector, publish.
//!
//! A message that fails to parse is logged and skipped; the loop only ends
//! on cancellation, when the queue closes, or when the output is gone.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tributary_core::{ExchangeId, OrderBookEvent};

use crate::domain::{ChannelKey, Connector, RawMessage};
use crate::error::ParseError;
use crate::presentation::MarketDataSink;

pub struct ChannelConsumer<C: Connector + ?Sized> {
    exchange: ExchangeId,
    channel: ChannelKey,
    connector: Arc<C>,
    queue: mpsc::Receiver<RawMessage>,
    sink: MarketDataSink,
}

impl<C: Connector + ?Sized> ChannelConsumer<C> {
    pub fn new(
        exchange: ExchangeId,
        channel: ChannelKey,
        connector: Arc<C>,
        queue: mpsc::Receiver<RawMessage>,
        sink: MarketDataSink,
    ) -> Self {
        ChannelConsumer {
            exchange,
            channel,
            connector,
            queue,
            sink,
        }
    }

    fn parse(&self, message: &RawMessage) -> Result<Vec<OrderBookEvent>, ParseError> {
        match self.channel {
            ChannelKey::Snapshot => self.connector.parse_snapshot(message),
            ChannelKey::Diff => self.connector.parse_diff(message),
            ChannelKey::Trade => self.connector.parse_trade(message),
            channel => Err(ParseError::Unsupported { channel }),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!(exchange = %self.exchange, channel = %self.channel, "consumer started");

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = self.queue.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let events = match self.parse(&message) {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(
                        exchange = %self.exchange,
                        channel = %self.channel,
                        error = %e,
                        "failed to parse message"
                    );
                    continue;
                }
            };

            for event in events {
                let published = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = self.sink.publish(event) => result,
                };
                if let Err(e) = published {
                    tracing::warn!(exchange = %self.exchange, channel = %self.channel, error = %e, "consumer stopping");
                    return;
                }
            }
        }

        tracing::debug!(exchange = %self.exchange, channel = %self.channel, "consumer stopped");
    }
}
