//! Application Layer - the runtime that drives a connector
//!
//! Each component runs as its own task and talks to the others only
//! through bounded queues and the shared output sink.

mod consumer;
mod data_source;
mod funding;
mod listener;
mod refresher;
mod router;
mod settings;

#[cfg(test)]
mod fakes;

pub use consumer::ChannelConsumer;
pub use data_source::{DataSourceHandle, MarketDataSource, spawn_enabled};
pub use funding::{FundingListener, FundingTracker};
pub use listener::{ListenerLifecycle, ListenerStats};
pub use refresher::{CycleReport, RefreshError, SnapshotRefresher, delay_until_next_window};
pub use router::{ChannelQueues, ChannelRouter, Classifier, RouteOutcome, RouterStats};
pub use settings::{DataSourceSettings, FundingSettings, ListenerSettings, RefresherSettings};
