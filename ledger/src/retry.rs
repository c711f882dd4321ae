//! HTTP retry policy with exponential backoff.
//!
//! # Retry Policy
//!
//! - Max retries: 3 (4 total attempts)
//! - Initial delay: 500ms
//! - Max delay: 8 seconds
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//!
//! # Retryable Conditions
//!
//! - HTTP 408, 409, 429, 5xx
//! - Connection errors and timeouts
//!
//! Every attempt goes through the shared [`RateLimiter`], so backoff sleeps add to
//! the limiter spacing rather than replacing it.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};

use crate::RateLimiter;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting initial request).
    pub max_retries: u32,
    /// Initial backoff delay before first retry.
    pub initial_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

/// Parse `Retry-After` or `Retry-After-Ms` headers.
///
/// Returns `Some(duration)` if a valid value is found and `0 < duration < 60s`.
/// Returns `None` if headers are missing, invalid, or out of range.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(val) = headers.get("retry-after-ms")
        && let Ok(s) = val.to_str()
        && let Ok(ms) = s.parse::<f64>()
    {
        let duration = Duration::from_secs_f64(ms.max(0.0) / 1000.0);
        if duration > Duration::ZERO && duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    if let Some(val) = headers.get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        let duration = Duration::from_secs(secs);
        if duration > Duration::ZERO && duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    None
}

/// Determine if a response status is retryable.
#[must_use]
pub fn should_retry(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        408 | 409 | 429 | 500 | 502 | 503 | 504 | 520..=599
    )
}

/// Calculate retry delay with exponential backoff and jitter.
///
/// - `backoff_step`: 0 before first retry, 1 before second, etc.
/// - Respects `Retry-After` headers if present and valid.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(headers) = headers
        && let Some(delay) = parse_retry_after(headers)
    {
        return delay;
    }

    // initial_delay * 2^backoff_step, capped
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step.min(30) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

/// Outcome of a retried request.
///
/// Success and failure are distinct variants so a caller cannot read an error
/// response as if it were a balance.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success { response: Response, attempts: u32 },
    /// Non-2xx response that was not retryable, or still failing after the last retry.
    HttpError { response: Response, attempts: u32 },
    /// Transport failure (including timeouts) on the final attempt.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
}

impl RetryOutcome {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::HttpError { attempts, .. }
            | Self::ConnectionError { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Send a request with rate limiting and automatic retries.
///
/// `build_request` is called once per attempt. Retries on connection errors,
/// timeouts and retryable statuses; uses `Retry-After` or exponential backoff
/// for the delay.
pub async fn send_with_retry<F>(
    limiter: &RateLimiter,
    build_request: F,
    config: &RetryConfig,
) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let mut retry_count = 0;
    loop {
        let attempts = retry_count + 1;
        let can_retry = retry_count < config.max_retries;

        limiter.acquire().await;
        match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return RetryOutcome::Success { response, attempts };
                }

                if can_retry && should_retry(status) {
                    let delay = calculate_retry_delay(retry_count, config, Some(response.headers()));
                    tracing::debug!(
                        status = %status,
                        retry_count = attempts,
                        delay_ms = delay.as_millis(),
                        "Retrying ledger request after error status"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                    continue;
                }

                return RetryOutcome::HttpError { response, attempts };
            }
            Err(e) => {
                if can_retry && is_retryable_error(&e) {
                    let delay = calculate_retry_delay(retry_count, config, None);
                    tracing::debug!(
                        error = %e,
                        retry_count = attempts,
                        delay_ms = delay.as_millis(),
                        "Retrying ledger request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                    continue;
                }

                return RetryOutcome::ConnectionError {
                    attempts,
                    source: e,
                };
            }
        }
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
