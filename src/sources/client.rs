//! Shared HTTP client for upstream registries
//!
//! Every adapter talks to its registry through one [`SourceClient`], which
//! provides:
//! - A bounded request timeout and a fixed user agent
//! - Rate limiting with governor, shared by all registries
//! - A small bounded retry for transient failures
//! - Mapping of HTTP outcomes into [`SourceError`]

use crate::config::FetcherConfig;
use crate::utils::error::SourceError;
use crate::utils::retry::{with_retry_if, RetryConfig};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, StatusCode,
};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Rate-limited JSON client used by all source adapters
pub struct SourceClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Retry policy for transient failures
    retry: RetryConfig,
}

impl SourceClient {
    /// Create a client from fetcher configuration
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Http` if the HTTP client cannot be created
    pub fn new(config: &FetcherConfig) -> Result<Self, SourceError> {
        Self::with_config(
            config.requests_per_second,
            config.retry_config(),
            config.request_timeout(),
            &config.user_agent,
        )
    }

    /// Create a client with explicit settings
    ///
    /// # Arguments
    ///
    /// * `requests_per_second` - Maximum number of requests per second (0 is treated as 1)
    /// * `retry` - Retry policy for transient failures
    /// * `timeout` - Request timeout duration
    /// * `user_agent` - User agent sent with every request
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Http` if the HTTP client cannot be created
    pub fn with_config(
        requests_per_second: u32,
        retry: RetryConfig,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(user_agent)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            retry,
        })
    }

    /// GET `url` and decode the JSON body into `T`
    ///
    /// Transient failures are retried according to the retry policy; the
    /// rate limiter is consulted before every attempt.
    ///
    /// # Errors
    ///
    /// - `SourceError::NotFound` for 404/410
    /// - `SourceError::Transient` for network failures, timeouts, 403, 429 and 5xx
    /// - `SourceError::Rejected` for any other non-success status
    /// - `SourceError::Decode` if the body is not the expected JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T, SourceError> {
        with_retry_if(
            &self.retry,
            move || self.get_json_once(url, headers.clone()),
            SourceError::is_transient,
        )
        .await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        mut headers: HeaderMap,
    ) -> Result<T, SourceError> {
        self.rate_limiter.until_ready().await;

        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        debug!(url = %url, "Requesting upstream");

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, url))?;

        if let Some(err) = Self::status_error(response.status(), url) {
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(e, url))?;

        serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(format!("{url}: {e}")))
    }

    /// Map a non-success status into the source error taxonomy
    ///
    /// GitHub answers 403 when the anonymous rate limit is exhausted, so 403
    /// is treated like 429.
    fn status_error(status: StatusCode, url: &str) -> Option<SourceError> {
        match status.as_u16() {
            200..=299 => None,
            404 | 410 => Some(SourceError::NotFound(url.to_string())),
            403 | 429 | 500..=599 => Some(SourceError::Transient(format!(
                "HTTP {} from {url}",
                status.as_u16()
            ))),
            code => Some(SourceError::Rejected {
                status: code,
                url: url.to_string(),
            }),
        }
    }

    fn transport_error(err: reqwest::Error, url: &str) -> SourceError {
        if err.is_builder() {
            return SourceError::Http(err);
        }
        if err.is_timeout() {
            return SourceError::Transient(format!("timeout requesting {url}"));
        }
        SourceError::Transient(format!("{url}: {err}"))
    }
}
