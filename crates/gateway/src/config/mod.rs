//! JSON configuration for the exchanges a gateway process ingests

mod loader;
mod types;

pub use loader::{ConfigError, load_config, load_config_from_str, load_default_config};
pub use types::{
    ConnectorKind, ExchangeConfig, FeedsConfig, FundingConfig, GlobalConfig, MarketDataConfig,
    RateLimitConfig,
};
