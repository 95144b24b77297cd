use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use shiftgen_core::{RemoteStoreError, ShiftError};
use tracing::warn;

use crate::config::GraphConnection;

/// Lets list queries filter on columns that are not indexed.
const NON_INDEXED_PREFER: &str = "HonorNonIndexedQueriesWarningMayFailRandomly";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMethod {
    Get,
    Post,
    Patch,
}

impl GraphMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for GraphMethod {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub method: GraphMethod,
    pub url: String,
    pub body: Option<Value>,
}

impl GraphRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: GraphMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: GraphMethod::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: GraphMethod::Patch,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Sends one Graph request and returns the decoded body. Bodiless success
/// responses decode to `Value::Null`; non-success answers surface as
/// [`ShiftError::Remote`].
#[async_trait]
pub trait GraphTransport: Send + Sync {
    async fn send(&self, request: GraphRequest) -> Result<Value, ShiftError>;
}

/// Backoff for throttled requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retry_after: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(60),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(status: u16) -> bool {
        matches!(status, 429 | 503 | 504)
    }

    /// Exponential backoff plus jitter, stretched to honour `Retry-After` and
    /// capped at `max_delay`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>, jitter: Duration) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .saturating_add(jitter);
        let server_hint = retry_after
            .map(|hint| hint.min(self.max_retry_after))
            .unwrap_or_default();
        backoff.max(server_hint).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}

/// `Retry-After` in whole or fractional seconds; HTTP dates are ignored.
pub fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    let seconds = header?.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1000.0).round() as u64))
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: Option<GraphErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Maps a non-success answer to a remote error, keeping the Graph error code
/// and the raw body for callers that inspect them.
pub fn graph_error(method: GraphMethod, status: u16, body: &str) -> ShiftError {
    let parsed = serde_json::from_str::<GraphErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);
    let code = parsed
        .as_ref()
        .and_then(|error| error.code.clone())
        .filter(|code| !code.is_empty());
    let message = parsed
        .and_then(|error| error.message)
        .filter(|message| !message.is_empty());

    let summary = [code.as_deref(), message.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(": ");
    let text = if summary.is_empty() {
        format!("Graph {method} failed: {status}")
    } else {
        format!("Graph {method} failed: {status} ({summary})")
    };

    let mut error = RemoteStoreError::new(status, text).with_details(body);
    if let Some(code) = code {
        error = error.with_code(code);
    }
    ShiftError::Remote(error)
}

pub struct ReqwestGraphTransport {
    access_token: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl fmt::Debug for ReqwestGraphTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReqwestGraphTransport")
            .field("access_token", &"<redacted>")
            .field("client", &self.client)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ReqwestGraphTransport {
    pub fn new(connection: &GraphConnection) -> Result<Self, ShiftError> {
        if connection.access_token.trim().is_empty() {
            return Err(ShiftError::Configuration(
                "GRAPH_BEARER_TOKEN is required to call Microsoft Graph.".to_owned(),
            ));
        }

        let client = reqwest::Client::builder()
            .user_agent("shiftgen/integration-graph")
            .build()
            .map_err(|err| {
                ShiftError::DependencyUnavailable(format!(
                    "failed to initialize Graph HTTP client: {err}"
                ))
            })?;

        Ok(Self {
            access_token: connection.access_token.trim().to_owned(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build(&self, request: &GraphRequest) -> reqwest::RequestBuilder {
        let builder = match request.method {
            GraphMethod::Get => self
                .client
                .get(&request.url)
                .header("Prefer", NON_INDEXED_PREFER),
            GraphMethod::Post => self.client.post(&request.url),
            GraphMethod::Patch => self.client.patch(&request.url),
        };
        let builder = builder
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "application/json");
        match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

#[async_trait]
impl GraphTransport for ReqwestGraphTransport {
    async fn send(&self, request: GraphRequest) -> Result<Value, ShiftError> {
        let mut attempt = 0;
        loop {
            let response = self.build(&request).send().await.map_err(|err| {
                ShiftError::DependencyUnavailable(format!(
                    "failed to call Microsoft Graph ({} {}): {err}",
                    request.method, request.url
                ))
            })?;

            let status = response.status();
            if status.is_success() {
                return read_success(request.method, status, response).await;
            }

            let code = status.as_u16();
            if RetryPolicy::is_retryable(code) && attempt < self.retry.max_retries {
                let retry_after = parse_retry_after(
                    response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok()),
                );
                // Drain so the connection can be reused.
                let _ = response.text().await;
                let delay = self.retry.delay(attempt, retry_after, self.retry.jitter());
                warn!(
                    method = %request.method,
                    status = code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Graph request throttled; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(graph_error(request.method, code, &body));
        }
    }
}

async fn read_success(
    method: GraphMethod,
    status: StatusCode,
    response: reqwest::Response,
) -> Result<Value, ShiftError> {
    if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(true);
    let body = response.text().await.map_err(|err| {
        ShiftError::DependencyUnavailable(format!(
            "failed to read Microsoft Graph {method} response: {err}"
        ))
    })?;

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    if !is_json {
        return Ok(Value::String(body));
    }

    serde_json::from_str(&body).map_err(|err| {
        ShiftError::DependencyUnavailable(format!(
            "failed to parse Microsoft Graph {method} response JSON: {err}"
        ))
    })
}
