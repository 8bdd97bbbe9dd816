//! Channel Router
//!
//! Classifies each inbound message and enqueues it on the bounded queue for
//! its channel without ever blocking the receive loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tributary_core::ExchangeId;

use crate::domain::{ChannelKey, RawMessage};

/// Overflow is logged once per this many dropped messages
const OVERFLOW_LOG_EVERY: u64 = 1_000;

/// Total, non-blocking message classifier
pub type Classifier = Arc<dyn Fn(&RawMessage) -> ChannelKey + Send + Sync>;

/// What happened to a routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Enqueued(ChannelKey),
    /// No queue exists for the key (including `Unknown`)
    Unmapped(ChannelKey),
    /// Queue full; the message was dropped
    Overflow(ChannelKey),
    /// Consumer gone; the message was dropped
    Closed(ChannelKey),
}

/// Routing counters, shared with whoever wants to observe them
#[derive(Debug)]
pub struct RouterStats {
    routed: HashMap<ChannelKey, AtomicU64>,
    unmapped: AtomicU64,
    overflow: AtomicU64,
    closed: AtomicU64,
}

impl RouterStats {
    fn new() -> Self {
        RouterStats {
            routed: ChannelKey::ALL
                .iter()
                .map(|key| (*key, AtomicU64::new(0)))
                .collect(),
            unmapped: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    /// Messages enqueued on `key`'s queue
    pub fn routed(&self, key: ChannelKey) -> u64 {
        self.routed
            .get(&key)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_routed(&self) -> u64 {
        self.routed.values().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn unmapped(&self) -> u64 {
        self.unmapped.load(Ordering::Relaxed)
    }

    pub fn overflow(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Receiving ends of the channel queues, handed out once each
#[derive(Debug)]
pub struct ChannelQueues {
    receivers: HashMap<ChannelKey, mpsc::Receiver<RawMessage>>,
}

impl ChannelQueues {
    pub fn take(&mut self, key: ChannelKey) -> Option<mpsc::Receiver<RawMessage>> {
        self.receivers.remove(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ChannelKey> {
        self.receivers.keys()
    }
}

pub struct ChannelRouter {
    exchange: ExchangeId,
    classifier: Classifier,
    senders: HashMap<ChannelKey, mpsc::Sender<RawMessage>>,
    stats: Arc<RouterStats>,
}

impl ChannelRouter {
    /// One bounded queue of `capacity` per channel in `channels`
    pub fn new(
        exchange: ExchangeId,
        channels: &[ChannelKey],
        capacity: usize,
        classifier: Classifier,
    ) -> (Self, ChannelQueues) {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for key in channels {
            if senders.contains_key(key) {
                continue;
            }
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.insert(*key, tx);
            receivers.insert(*key, rx);
        }

        let router = ChannelRouter {
            exchange,
            classifier,
            senders,
            stats: Arc::new(RouterStats::new()),
        };
        (router, ChannelQueues { receivers })
    }

    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelKey> {
        self.senders.keys()
    }

    pub fn route(&self, message: RawMessage) -> RouteOutcome {
        let key = (self.classifier)(&message);

        let Some(sender) = self.senders.get(&key) else {
            self.stats.unmapped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(exchange = %self.exchange, channel = %key, "dropping unmapped message");
            return RouteOutcome::Unmapped(key);
        };

        match sender.try_send(message) {
            Ok(()) => {
                if let Some(count) = self.stats.routed.get(&key) {
                    count.fetch_add(1, Ordering::Relaxed);
                }
                RouteOutcome::Enqueued(key)
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.overflow.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % OVERFLOW_LOG_EVERY == 1 {
                    tracing::warn!(
                        exchange = %self.exchange,
                        channel = %key,
                        dropped,
                        "channel queue full, dropping newest messages"
                    );
                }
                RouteOutcome::Overflow(key)
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.closed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(exchange = %self.exchange, channel = %key, "channel consumer gone");
                RouteOutcome::Closed(key)
            }
        }
    }
}
