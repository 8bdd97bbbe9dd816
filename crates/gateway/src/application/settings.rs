use std::time::Duration;

/// Runtime knobs for one exchange's data source
#[derive(Debug, Clone)]
pub struct DataSourceSettings {
    /// Capacity of each per-channel queue
    pub queue_capacity: usize,
    pub listener: ListenerSettings,
    pub refresher: RefresherSettings,
    pub funding: FundingSettings,
}

impl DataSourceSettings {
    pub fn new(ws_url: impl Into<String>) -> Self {
        DataSourceSettings {
            queue_capacity: 10_000,
            listener: ListenerSettings::new(ws_url),
            refresher: RefresherSettings::default(),
            funding: FundingSettings::default(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.listener.reconnect_delay = delay;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.listener.keepalive_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.listener.response_timeout = timeout;
        self
    }

    pub fn with_refresher(mut self, refresher: RefresherSettings) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn with_funding(mut self, funding: FundingSettings) -> Self {
        self.funding = funding;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub ws_url: String,
    /// Idle time before a keepalive is sent
    pub keepalive_interval: Duration,
    /// Silence after which the session is treated as dead
    pub response_timeout: Duration,
    /// Fixed wait in Backoff, never grows
    pub reconnect_delay: Duration,
}

impl ListenerSettings {
    pub fn new(ws_url: impl Into<String>) -> Self {
        ListenerSettings {
            ws_url: ws_url.into(),
            keepalive_interval: Duration::from_secs(20),
            response_timeout: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefresherSettings {
    pub enabled: bool,
    /// Window length; windows are aligned to the UNIX epoch
    pub interval: Duration,
    /// Wait before retrying a cycle in which every pair failed
    pub recovery_delay: Duration,
    pub refresh_on_start: bool,
}

impl Default for RefresherSettings {
    fn default() -> Self {
        RefresherSettings {
            enabled: true,
            interval: Duration::from_secs(60 * 60),
            recovery_delay: Duration::from_secs(5),
            refresh_on_start: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FundingSettings {
    pub enabled: bool,
    /// Poll period for venues without a funding push channel
    pub poll_interval: Duration,
    /// Wait before retrying pairs whose bootstrap failed
    pub retry_delay: Duration,
}

impl Default for FundingSettings {
    fn default() -> Self {
        FundingSettings {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            retry_delay: Duration::from_secs(5),
        }
    }
}
