//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client
//! - Per-request headers, cookies and timeout
//! - Retry logic for transient failures
//! - Content-type-aware decoding of response bodies
//! - Batched concurrent fetches
//!
//! Fetch failures are never returned as errors. Callers get a [`FetchResult`]
//! and decide whether to record, skip or retry the unit later.

use crate::config::FetcherConfig;
use crate::{ConfigError, CrawlError};
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body declared as JSON and parsed successfully
    Json(serde_json::Value),
    /// Anything else, kept verbatim
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json(_))
    }
}

/// A successfully fetched response
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status_code: u16,
    pub content_type: String,
    pub payload: Payload,
}

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The server answered with a 2xx status
    Fetched(FetchedPage),

    /// The server gave a definite negative answer (e.g. 404); not retried
    Rejected {
        /// The HTTP status code
        status_code: u16,
    },

    /// Every attempt hit a transient error (timeout, connection, 408/429/5xx)
    SoftFailure {
        /// Description of the last error
        error: String,
        /// Status of the last attempt, if the server answered at all
        status_code: Option<u16>,
        /// Number of attempts made
        attempts: u32,
    },
}

impl FetchResult {
    pub fn is_soft_failure(&self) -> bool {
        matches!(self, FetchResult::SoftFailure { .. })
    }
}

/// Per-request settings applied to every fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Extra headers, including the combined `Cookie` header
    pub headers: HeaderMap,
    /// Timeout of a single attempt, body included
    pub timeout: Duration,
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `retry_backoff * n`
    pub retry_backoff: Duration,
}

impl FetchOptions {
    /// Builds fetch options from the fetcher configuration
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOptions)` - Options ready for use
    /// * `Err(CrawlError)` - A configured header or cookie is not a valid header value
    pub fn from_config(config: &FetcherConfig) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();

        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::Validation(format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ConfigError::Validation(format!("Invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(name, value);
        }

        if !config.cookies.is_empty() {
            let mut pairs: Vec<String> = config
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            pairs.sort();
            let cookie = HeaderValue::from_str(&pairs.join("; "))
                .map_err(|e| ConfigError::Validation(format!("Invalid cookie value: {}", e)))?;
            headers.insert(COOKIE, cookie);
        }

        Ok(Self {
            headers,
            timeout: Duration::from_millis(config.timeout_ms),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }
}

/// Builds an HTTP client with proper configuration
///
/// The client owns the connection pool shared by every fetch of a run.
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_millis(config.timeout_ms))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of a single attempt
enum Attempt {
    Done(FetchResult),
    Transient {
        error: String,
        status_code: Option<u16>,
    },
}

/// Transient statuses worth another attempt
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn decode_body(content_type: &str, body: String) -> Payload {
    if content_type.contains("json") {
        match serde_json::from_str(&body) {
            Ok(value) => return Payload::Json(value),
            Err(e) => tracing::debug!("Body declared as JSON failed to parse: {}", e),
        }
    }
    Payload::Text(body)
}

async fn attempt_once(client: &Client, url: &str, options: &FetchOptions) -> Attempt {
    let response = match client
        .get(url)
        .headers(options.headers.clone())
        .timeout(options.timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                e.to_string()
            };
            return Attempt::Transient {
                error,
                status_code: None,
            };
        }
    };

    let status = response.status();

    if is_retryable_status(status) {
        return Attempt::Transient {
            error: format!("HTTP {}", status.as_u16()),
            status_code: Some(status.as_u16()),
        };
    }

    if !status.is_success() {
        return Attempt::Done(FetchResult::Rejected {
            status_code: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match response.text().await {
        Ok(body) => Attempt::Done(FetchResult::Fetched(FetchedPage {
            status_code: status.as_u16(),
            payload: decode_body(&content_type, body),
            content_type,
        })),
        Err(e) => Attempt::Transient {
            error: format!("Failed to read body: {}", e),
            status_code: Some(status.as_u16()),
        },
    }
}

/// Fetches a URL with retry logic
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx | `Fetched` |
/// | HTTP 408, 429, 5xx | Retry |
/// | Other HTTP status | Immediate `Rejected` |
/// | Timeout, connection error | Retry |
/// | Body read error | Retry |
///
/// After `max_attempts` transient failures the call returns
/// `FetchResult::SoftFailure`.
pub async fn fetch_url(client: &Client, url: &str, options: &FetchOptions) -> FetchResult {
    let max_attempts = options.max_attempts.max(1);
    let mut last_error = String::new();
    let mut last_status = None;

    for attempt in 1..=max_attempts {
        match attempt_once(client, url, options).await {
            Attempt::Done(result) => return result,
            Attempt::Transient { error, status_code } => {
                tracing::debug!(
                    "Attempt {}/{} for {} failed: {}",
                    attempt,
                    max_attempts,
                    url,
                    error
                );
                last_error = error;
                last_status = status_code;

                if attempt < max_attempts && !options.retry_backoff.is_zero() {
                    tokio::time::sleep(options.retry_backoff * attempt).await;
                }
            }
        }
    }

    tracing::warn!(
        "Giving up on {} after {} attempts: {}",
        url,
        max_attempts,
        last_error
    );

    FetchResult::SoftFailure {
        error: last_error,
        status_code: last_status,
        attempts: max_attempts,
    }
}

/// Fetches all URLs concurrently over the shared client
///
/// The returned vector has the same length and order as `urls`. A failing
/// URL yields a `SoftFailure` or `Rejected` entry in its own slot.
pub async fn fetch_all(client: &Client, urls: &[String], options: &FetchOptions) -> Vec<FetchResult> {
    join_all(urls.iter().map(|url| fetch_url(client, url, options))).await
}

/// A client bundled with its fetch options
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            client: build_http_client(config)?,
            options: FetchOptions::from_config(config)?,
        })
    }

    pub async fn fetch(&self, url: &str) -> FetchResult {
        fetch_url(&self.client, url, &self.options).await
    }

    pub async fn fetch_all(&self, urls: &[String]) -> Vec<FetchResult> {
        fetch_all(&self.client, urls, &self.options).await
    }
}
