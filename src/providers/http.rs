//! Rate limiting and retry logic for provider HTTP calls
//!
//! Every HTTP adapter goes through a [`RateLimitedClient`]: requests wait on
//! a governor quota, transient failures (timeouts, 408/429/5xx) are retried
//! with exponential backoff, anything else fails immediately. Form POSTs
//! change remote state, so they are only retried after a 429.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
        }
    }
}

/// Failure of a single request attempt
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    Fatal(String),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) | Self::Fatal(msg) => f.write_str(msg),
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: &'static str,
    retry: RetryConfig,
}

impl RateLimitedClient {
    pub fn new(name: &'static str, config: RateLimitConfig) -> SyncResult<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Configuration(format!("{} HTTP client: {}", name, e)))?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name,
            retry: RetryConfig::default(),
        })
    }

    /// Client for the debrid REST API
    pub fn for_real_debrid() -> SyncResult<Self> {
        // Real-Debrid allows 250 requests per minute
        Self::new(
            "real-debrid",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 10,
            },
        )
    }

    /// Client for a self-hosted movie or series manager
    pub fn for_arr(name: &'static str) -> SyncResult<Self> {
        Self::new(
            name,
            RateLimitConfig {
                requests_per_second: 10,
                burst_size: 20,
            },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }

    /// One attempt. For anything but GET only a 429 is transient.
    async fn send_once(&self, request: RequestSpec<'_>) -> Result<Response, AttemptError> {
        self.wait_for_permit().await;
        debug!(
            client = self.name,
            method = %request.method,
            url = %request.url,
            "Making rate-limited request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), request.url)
            .query(request.query);
        if let Some(form) = request.form {
            builder = builder.form(form);
        }
        for (key, value) in request.headers {
            builder = builder.header(*key, *value);
        }

        let url = request.url;
        let idempotent = request.method == Method::GET;
        let response = builder.send().await.map_err(|e| {
            if idempotent && (e.is_timeout() || e.is_connect()) {
                AttemptError::Transient(format!("request to {} failed: {}", url, e))
            } else {
                AttemptError::Fatal(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        let transient = if idempotent {
            response.is_transient_error()
        } else {
            status == StatusCode::TOO_MANY_REQUESTS
        };
        if transient {
            return Err(AttemptError::Transient(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(format!("{} returned {}", url, status)));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestSpec<'_>) -> SyncResult<Option<T>> {
        let url = request.url;
        let response = retry_async_if(
            || self.send_once(request.clone()),
            &self.retry,
            url,
            AttemptError::is_transient,
        )
        .await
        .map_err(|e| SyncError::provider(self.name, e.to_string()))?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| SyncError::provider(self.name, format!("invalid response from {}: {}", url, e)))?;
        Ok(Some(body))
    }

    /// GET and decode a JSON body, retrying transient failures.
    /// `204 No Content` yields `None`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &[(&str, String)],
    ) -> SyncResult<Option<T>> {
        self.send_json(RequestSpec {
            method: Method::GET,
            url,
            headers,
            query,
            form: None,
        })
        .await
    }

    /// POST a urlencoded form and decode the JSON reply, if any.
    /// Only rate-limit rejections are retried.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, String)],
    ) -> SyncResult<Option<T>> {
        self.send_json(RequestSpec {
            method: Method::POST,
            url,
            headers,
            query: &[],
            form: Some(form),
        })
        .await
    }
}

#[derive(Clone)]
struct RequestSpec<'a> {
    method: Method,
    url: &'a str,
    headers: &'a [(&'a str, &'a str)],
    query: &'a [(&'a str, String)],
    form: Option<&'a [(&'a str, String)]>,
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        }
    }
}

/// Execute an async operation with retry logic, giving up at once on
/// errors `should_retry` rejects
pub async fn retry_async_if<T, E, Fut, F, P>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if attempts >= config.max_retries {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = %operation_name,
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = duration.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

/// Helper trait for classifying HTTP responses
pub trait ResponseExt {
    /// Check if the response indicates a transient error that should be retried
    fn is_transient_error(&self) -> bool;
}

impl ResponseExt for Response {
    fn is_transient_error(&self) -> bool {
        let status = self.status().as_u16();
        // 429 (rate limit), 500-599 (server errors), 408 (timeout)
        status == 429 || status == 408 || (500..600).contains(&status)
    }
}
