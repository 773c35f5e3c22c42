//! Completion API client
//!
//! Wraps the remote chat completions endpoint with bearer auth, a shared
//! token bucket, and exponential-backoff retries for transient failures.

use std::borrow::Cow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};
use url::Url;

use super::rate_limit::TokenBucket;
use super::types::{ApiErrorBody, CompletionRequest, CompletionResponse};
use crate::core::config::AppConfig;
use crate::core::context::RequestContext;
use crate::errors::SummaryError;

/// Upper bound applied to server-supplied `Retry-After` hints.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

const MAX_ERROR_BODY_CHARS: usize = 500;

#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

/// Longest backoff sleep between two attempts.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// Sleeps between consecutive attempts: `base * 2^n` for `n = 1..`, capped at
/// [`MAX_BACKOFF_DELAY`], one entry per retry after the first attempt.
pub fn retry_schedule(base: Duration, max_attempts: u32) -> impl Iterator<Item = Duration> {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    ExponentialBackoff::from_millis(2)
        .factor(base_ms)
        .max_delay(MAX_BACKOFF_DELAY)
        .take(max_attempts.saturating_sub(1) as usize)
}

/// A `Retry-After` hint can stretch the scheduled backoff up to
/// [`MAX_RETRY_AFTER`] but never shorten it.
#[must_use]
pub fn retry_delay(backoff: Duration, retry_after: Option<Duration>) -> Duration {
    retry_after.map_or(backoff, |hint| hint.min(MAX_RETRY_AFTER).max(backoff))
}

/// Settings for [`CompletionClient`]. Usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct CompletionClientConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub requests_per_minute: u32,
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl CompletionClientConfig {
    /// Returns `None` when no API key is configured.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self {
            api_key,
            model: config.model().to_string(),
            base_url: config.base_url().to_string(),
            request_timeout: config.request_timeout(),
            requests_per_minute: config.api_rate_limit,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay(),
        })
    }
}

/// How a single attempt failed.
#[derive(Debug)]
enum AttemptFailure {
    Auth(String),
    Rejected { status: u16, message: String },
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    Server { status: u16, message: String },
    Transport(String),
    Decode(String),
}

impl AttemptFailure {
    const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Transport(_)
        )
    }

    const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Auth(m) | Self::Transport(m) | Self::Decode(m) => m.clone(),
            Self::RateLimited { message, .. } => format!("rate limited (429): {message}"),
            Self::Rejected { status, message } | Self::Server { status, message } => {
                format!("status {status}: {message}")
            }
        }
    }

    fn into_error(self, attempts: u32) -> SummaryError {
        match self {
            Self::Auth(message) => SummaryError::UpstreamAuth(message),
            Self::Rejected { status, message } => {
                SummaryError::UpstreamRejected { status, message }
            }
            Self::Decode(message) => SummaryError::InvalidResponse(message),
            retryable => SummaryError::UpstreamTransient {
                attempts,
                message: retryable.describe(),
            },
        }
    }
}

/// Client for the chat completions endpoint.
///
/// Safe to share between concurrent requests; the rate limiter is the only
/// mutable state.
#[derive(Debug)]
pub struct CompletionClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_base_delay: Duration,
    limiter: Option<TokenBucket>,
}

impl CompletionClient {
    /// # Errors
    ///
    /// Returns [`SummaryError::ClientUnavailable`] when the API key is blank and
    /// [`SummaryError::Configuration`] when the base URL or HTTP client can't be built.
    pub fn new(config: CompletionClientConfig) -> Result<Self, SummaryError> {
        if config.api_key.trim().is_empty() {
            return Err(SummaryError::ClientUnavailable);
        }

        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .map_err(|e| SummaryError::Configuration(format!("Invalid completion base URL: {e}")))?;

        let request_timeout = if config.request_timeout.is_zero() {
            Duration::from_secs(30)
        } else {
            config.request_timeout
        };
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                SummaryError::Configuration(format!("Failed to build completion HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key,
            model: config.model,
            max_retries: if config.max_retries == 0 {
                3
            } else {
                config.max_retries
            },
            retry_base_delay: config.retry_base_delay,
            limiter: TokenBucket::per_minute(config.requests_per_minute),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends `request`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`SummaryError::InvalidRequest`] if the request has no messages.
    /// - [`SummaryError::RateLimitWaitCancelled`] if `ctx` ends while waiting for a token.
    /// - [`SummaryError::Cancelled`] if `ctx` ends during a call or a backoff sleep.
    /// - [`SummaryError::UpstreamAuth`] / [`SummaryError::UpstreamRejected`] immediately on 401 / other 4xx.
    /// - [`SummaryError::UpstreamTransient`] once every attempt has failed with 429, 5xx or a transport error.
    /// - [`SummaryError::InvalidResponse`] if a 2xx body does not decode.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, SummaryError> {
        if request.messages.is_empty() {
            return Err(SummaryError::InvalidRequest(
                "completion request needs at least one message".to_string(),
            ));
        }

        let body: Cow<'_, CompletionRequest> = if request.model.trim().is_empty() {
            Cow::Owned(CompletionRequest {
                model: self.model.clone(),
                ..request.clone()
            })
        } else {
            Cow::Borrowed(request)
        };

        let mut schedule = retry_schedule(self.retry_base_delay, self.max_retries);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if let Some(limiter) = &self.limiter {
                limiter.acquire(ctx).await?;
            }

            debug!(
                correlation_id = ctx.correlation_id(),
                "Completion attempt {}/{} to {}", attempt, self.max_retries, self.endpoint
            );

            let outcome = tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    return Err(SummaryError::Cancelled(
                        "completion request interrupted by cancellation or deadline".to_string(),
                    ));
                }
                outcome = self.send_once(&body) => outcome,
            };

            let failure = match outcome {
                Ok(response) => {
                    info!(
                        correlation_id = ctx.correlation_id(),
                        "Completion {} succeeded after {} attempt(s)", response.id, attempt
                    );
                    return Ok(response);
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() {
                warn!(
                    correlation_id = ctx.correlation_id(),
                    "Completion failed without retry: {}",
                    failure.describe()
                );
                return Err(failure.into_error(attempt));
            }

            let Some(backoff) = schedule.next() else {
                warn!(
                    correlation_id = ctx.correlation_id(),
                    "Completion failed after {} attempt(s): {}",
                    attempt,
                    failure.describe()
                );
                return Err(failure.into_error(attempt));
            };

            let delay = retry_delay(backoff, failure.retry_after());

            warn!(
                correlation_id = ctx.correlation_id(),
                "Completion attempt {} failed ({}), retrying in {:?}",
                attempt,
                failure.describe(),
                delay
            );

            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    return Err(SummaryError::Cancelled(format!(
                        "backoff after attempt {attempt} interrupted by cancellation or deadline"
                    )));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn send_once(
        &self,
        body: &CompletionRequest,
    ) -> Result<CompletionResponse, AttemptFailure> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport(format!("Completion request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let text = response.text().await.map_err(|e| {
                AttemptFailure::Transport(format!("Failed to read completion response: {e}"))
            })?;
            return serde_json::from_str::<CompletionResponse>(&text).map_err(|e| {
                AttemptFailure::Decode(format!("Failed to decode completion response: {e}"))
            });
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let error_text = response.text().await.unwrap_or_else(|e| {
            format!("Failed to read error response body (status {status}): {e}")
        });

        Err(classify_status(status, &error_text, retry_after))
    }
}

fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> AttemptFailure {
    let message = extract_error_message(body);
    match status {
        StatusCode::UNAUTHORIZED => AttemptFailure::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => AttemptFailure::RateLimited {
            message,
            retry_after,
        },
        s if s.is_server_error() => AttemptFailure::Server {
            status: s.as_u16(),
            message,
        },
        s => AttemptFailure::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => {
            let mut message = parsed.error.message;
            if let Some(code) = parsed.error.code.or(parsed.error.kind) {
                message = format!("{message} (code={code})");
            }
            message
        }
        _ => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

/// Parses a `Retry-After` value given as delta-seconds or an HTTP date.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
