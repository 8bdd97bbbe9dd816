use std::path::Path;

use thiserror::Error;
use url::Url;

use super::types::{ExchangeConfig, FeedsConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("No enabled exchanges in config")]
    NoEnabledExchanges,
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load feed configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FeedsConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<FeedsConfig, ConfigError> {
    let config: FeedsConfig = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<FeedsConfig, ConfigError> {
    load_config_from_str(include_str!("feeds.json"))
}

impl FeedsConfig {
    /// Get only enabled exchanges
    pub fn enabled_exchanges(&self) -> Vec<&ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled).collect()
    }

    /// Get a specific exchange by ID
    pub fn get_exchange(&self, id: &str) -> Result<&ExchangeConfig, ConfigError> {
        self.exchanges
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| ConfigError::ExchangeNotFound(id.to_string()))
    }

    /// Validate the configuration
    ///
    /// Intervals and timeouts must be non-zero. A connector whose REST
    /// snapshot follows one streamed depth's update ids must stream that
    /// depth while the snapshot refresher is on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled = self.enabled_exchanges();
        if enabled.is_empty() {
            return Err(ConfigError::NoEnabledExchanges);
        }
        if self.global.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".into()));
        }
        positive("global", "reconnect_delay_ms", self.global.reconnect_delay_ms)?;
        positive("global", "keepalive_interval_ms", self.global.keepalive_interval_ms)?;
        positive("global", "response_timeout_ms", self.global.response_timeout_ms)?;
        positive("global", "connect_timeout_ms", self.global.connect_timeout_ms)?;

        for exchange in enabled {
            exchange.validate()?;
        }
        Ok(())
    }
}

impl ExchangeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id.as_str();
        Url::parse(&self.rest_url)
            .map_err(|e| ConfigError::Invalid(format!("{id}: rest_url {}: {e}", self.rest_url)))?;
        Url::parse(&self.ws_url)
            .map_err(|e| ConfigError::Invalid(format!("{id}: ws_url {}: {e}", self.ws_url)))?;
        if self.trading_pairs.is_empty() {
            return Err(ConfigError::Invalid(format!("{id}: no trading pairs")));
        }
        if self.rate_limits.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(format!(
                "{id}: max_concurrent_requests must be positive"
            )));
        }
        positive(id, "request_timeout_ms", self.rate_limits.request_timeout_ms)?;
        if let Some(keepalive) = self.keepalive_interval_ms {
            positive(id, "keepalive_interval_ms", keepalive)?;
        }

        let market_data = &self.market_data;
        if market_data.snapshot_refresh {
            positive(id, "snapshot_interval_ms", market_data.snapshot_interval_ms)?;
            positive(id, "snapshot_recovery_delay_ms", market_data.snapshot_recovery_delay_ms)?;
            if let Some(depth) = self.connector.rest_snapshot_stream_depth()
                && market_data.stream_depth != depth
            {
                return Err(ConfigError::Invalid(format!(
                    "{id}: REST snapshots carry the {depth}-level stream's update ids, \
                     so stream_depth must be {depth} while snapshot_refresh is on (got {})",
                    market_data.stream_depth
                )));
            }
        }

        if self.funding.enabled {
            positive(id, "poll_interval_ms", self.funding.poll_interval_ms)?;
            positive(id, "retry_delay_ms", self.funding.retry_delay_ms)?;
        }
        Ok(())
    }
}

fn positive(scope: &str, name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{scope}: {name} must be positive")));
    }
    Ok(())
}
