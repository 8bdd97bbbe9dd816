use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::error::FetchError;

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {code} - {msg}")]
    Api { code: i64, msg: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convert infrastructure RestError to domain FetchError
impl From<RestError> for FetchError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Http(e) => FetchError::Network(e.to_string()),
            RestError::Api { code, msg } => FetchError::Api { code, message: msg },
            RestError::Parse(msg) => FetchError::Parse(msg),
        }
    }
}

/// Bounds in-flight requests per endpoint path
#[derive(Debug)]
pub struct EndpointThrottle {
    permits_per_endpoint: usize,
    endpoints: DashMap<String, Arc<Semaphore>>,
}

impl EndpointThrottle {
    pub fn new(permits_per_endpoint: usize) -> Self {
        EndpointThrottle {
            permits_per_endpoint: permits_per_endpoint.max(1),
            endpoints: DashMap::new(),
        }
    }

    fn semaphore(&self, endpoint: &str) -> Arc<Semaphore> {
        self.endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits_per_endpoint)))
            .clone()
    }

    /// Requests currently allowed to start on `endpoint`
    pub fn available(&self, endpoint: &str) -> usize {
        self.semaphore(endpoint).available_permits()
    }
}

/// REST API client shared by a connector's snapshot and funding calls
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    throttle: Arc<EndpointThrottle>,
    request_timeout: Duration,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        max_concurrent_per_endpoint: usize,
        request_timeout: Duration,
    ) -> Self {
        RestClient {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            throttle: Arc::new(EndpointThrottle::new(max_concurrent_per_endpoint)),
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn throttle(&self) -> &EndpointThrottle {
        &self.throttle
    }

    /// GET `endpoint` with query parameters, decoding the JSON body
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, RestError> {
        let semaphore = self.throttle.semaphore(endpoint);
        // Semaphores are never closed
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| RestError::Parse(e.to_string()))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, RestError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            if let Some((code, msg)) = api_error(&text) {
                return Err(RestError::Api { code, msg });
            }
            return Err(RestError::Parse(format!("HTTP {}: {}", status, text)));
        }

        serde_json::from_str(&text).map_err(|e| RestError::Parse(e.to_string()))
    }
}

/// Error bodies come as `{code, msg}` (Binance) or `{retCode, retMsg}` (Bybit)
fn api_error(body: &str) -> Option<(i64, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let code = value.get("code").or_else(|| value.get("retCode"))?.as_i64()?;
    let msg = value
        .get("msg")
        .or_else(|| value.get("retMsg"))
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    Some((code, msg))
}
