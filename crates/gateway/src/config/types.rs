use std::time::Duration;

use serde::{Deserialize, Serialize};
use tributary_core::{ExchangeId, TradingPair};

use crate::application::{DataSourceSettings, FundingSettings, ListenerSettings, RefresherSettings};

/// Root configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub global: GlobalConfig,
}

/// Which connector implementation drives an exchange entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    BinancePerpetual,
    BybitPerpetual,
}

impl ConnectorKind {
    /// Depth of the streamed book whose update ids the REST snapshot
    /// carries. `None` when every stream depth shares one sequence.
    pub fn rest_snapshot_stream_depth(self) -> Option<u32> {
        match self {
            ConnectorKind::BinancePerpetual => None,
            ConnectorKind::BybitPerpetual => Some(1000),
        }
    }
}

/// Configuration for a single exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Unique identifier (e.g., "binance_perpetual")
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub connector: ConnectorKind,
    /// REST API base URL
    pub rest_url: String,
    /// WebSocket URL
    pub ws_url: String,
    pub trading_pairs: Vec<TradingPair>,
    /// Overrides the global keepalive interval
    #[serde(default)]
    pub keepalive_interval_ms: Option<u64>,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub funding: FundingConfig,
}

impl ExchangeConfig {
    pub fn exchange_id(&self) -> ExchangeId {
        ExchangeId::new(&self.id)
    }

    /// Runtime settings for this exchange's data source
    pub fn settings(&self, global: &GlobalConfig) -> DataSourceSettings {
        let keepalive = self
            .keepalive_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| global.keepalive_interval());

        DataSourceSettings {
            queue_capacity: global.queue_capacity,
            listener: ListenerSettings {
                ws_url: self.ws_url.clone(),
                keepalive_interval: keepalive,
                response_timeout: global.response_timeout(),
                reconnect_delay: global.reconnect_delay(),
            },
            refresher: RefresherSettings {
                enabled: self.market_data.snapshot_refresh,
                interval: Duration::from_millis(self.market_data.snapshot_interval_ms),
                recovery_delay: Duration::from_millis(self.market_data.snapshot_recovery_delay_ms),
                refresh_on_start: self.market_data.refresh_on_start,
            },
            funding: FundingSettings {
                enabled: self.funding.enabled,
                poll_interval: Duration::from_millis(self.funding.poll_interval_ms),
                retry_delay: Duration::from_millis(self.funding.retry_delay_ms),
            },
        }
    }
}

/// REST rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// In-flight requests allowed per endpoint
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Whole-request timeout, connect through body
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl RateLimitConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Order book feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Levels requested from the REST snapshot endpoint
    #[serde(default = "default_snapshot_depth")]
    pub snapshot_depth: u32,
    /// Levels of the streamed book, for venues with fixed-depth topics
    #[serde(default = "default_stream_depth")]
    pub stream_depth: u32,
    #[serde(default = "default_true")]
    pub snapshot_refresh: bool,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_snapshot_recovery_delay")]
    pub snapshot_recovery_delay_ms: u64,
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        MarketDataConfig {
            snapshot_depth: default_snapshot_depth(),
            stream_depth: default_stream_depth(),
            snapshot_refresh: true,
            snapshot_interval_ms: default_snapshot_interval(),
            snapshot_recovery_delay_ms: default_snapshot_recovery_delay(),
            refresh_on_start: true,
        }
    }
}

/// Funding feed configuration (perpetual connectors)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Used only when the venue has no funding push channel
    #[serde(default = "default_funding_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_funding_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        FundingConfig {
            enabled: true,
            poll_interval_ms: default_funding_poll_interval(),
            retry_delay_ms: default_funding_retry_delay(),
        }
    }
}

/// Global configuration that applies to all exchanges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Fixed delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Idle time before a keepalive is sent
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_ms: u64,
    /// Silence after which a connection is considered dead
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Capacity of each per-channel queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            reconnect_delay_ms: default_reconnect_delay(),
            keepalive_interval_ms: default_keepalive_interval(),
            response_timeout_ms: default_response_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl GlobalConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_max_concurrent_requests() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_snapshot_depth() -> u32 {
    1000
}

fn default_stream_depth() -> u32 {
    50
}

fn default_snapshot_interval() -> u64 {
    60 * 60 * 1000
}

fn default_snapshot_recovery_delay() -> u64 {
    5000
}

fn default_funding_poll_interval() -> u64 {
    60_000
}

fn default_funding_retry_delay() -> u64 {
    5000
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_keepalive_interval() -> u64 {
    20_000
}

fn default_response_timeout() -> u64 {
    60_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    10_000
}
