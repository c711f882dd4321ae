//! Existence checks against the remote ledger.
//!
//! [`LedgerClient`] issues `GET {rpc_url}/v1/balances/{identity}` through a shared
//! [`RateLimiter`] with bounded retries. Every failure mode folds into a
//! [`ValidationResult`]; this crate never returns a transport error to the
//! orchestrator, it returns an indeterminate result instead.
//!
//! # Outcomes
//!
//! | Response | Result |
//! |----------|--------|
//! | 200 with `balance.validForTick` | present |
//! | 200 without `validForTick`, or 404 | absent |
//! | timeout / transport failure after retries | indeterminate (`timeout` / `transport`) |
//! | other status after retries | indeterminate (`http_status`) |
//! | unparseable 200 body | indeterminate (`malformed_response`) |

pub mod rate_limit;
pub mod retry;
mod rpc;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub use rate_limit::RateLimiter;
pub use retry::{RetryConfig, RetryOutcome, send_with_retry};
use sieve_types::{Identity, RemoteError, RemoteErrorKind, ValidationResult};

pub const DEFAULT_RPC_URL: &str = "https://rpc.qubic.li";

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

pub type CheckFut<'a> = Pin<Box<dyn Future<Output = ValidationResult> + Send + 'a>>;

/// Anything that can decide whether an identity exists on the ledger.
///
/// Implementations must be read-only and idempotent: the orchestrator may issue
/// the same check again after a resume.
pub trait IdentityValidator: Send + Sync {
    fn check<'a>(&'a self, identity: &'a Identity) -> CheckFut<'a>;
}

impl<T: IdentityValidator + ?Sized> IdentityValidator for Arc<T> {
    fn check<'a>(&'a self, identity: &'a Identity) -> CheckFut<'a> {
        (**self).check(identity)
    }
}

/// Connection and pacing settings for one run.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Per-request deadline, covering connect, send and body read.
    pub request_timeout: Duration,
    /// Minimum spacing between any two outgoing calls.
    pub rate_limit: Duration,
    pub retry: RetryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            request_timeout: Duration::from_secs(12),
            rate_limit: Duration::from_millis(200),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid RPC URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP implementation of [`IdentityValidator`].
#[derive(Debug, Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl LedgerClient {
    /// Build a client with its own limiter.
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self::with_limiter(config, limiter)
    }

    /// Build a client that paces its calls through an existing limiter.
    pub fn with_limiter(
        config: &LedgerConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, LedgerError> {
        let base_url = normalize_base_url(&config.rpc_url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(config.request_timeout))
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .user_agent(concat!("sieve/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            limiter,
            retry: config.retry.clone(),
        })
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn balance_url(&self, identity: &Identity) -> String {
        format!("{}/v1/balances/{}", self.base_url, identity)
    }

    async fn check_identity(&self, identity: &Identity) -> ValidationResult {
        let url = self.balance_url(identity);
        let outcome = send_with_retry(&self.limiter, || self.http.get(&url), &self.retry).await;
        let attempts = outcome.attempts();

        let result = match outcome {
            RetryOutcome::Success { response, .. } => match response.bytes().await {
                Ok(body) => rpc::interpret_success(identity.clone(), &body),
                Err(e) => ValidationResult::indeterminate(identity.clone(), classify(&e)),
            },
            RetryOutcome::HttpError { response, .. } if response.status() == StatusCode::NOT_FOUND => {
                ValidationResult::absent(identity.clone())
            }
            RetryOutcome::HttpError { response, .. } => ValidationResult::indeterminate(
                identity.clone(),
                RemoteError::new(
                    RemoteErrorKind::HttpStatus,
                    format!("HTTP {}", response.status()),
                ),
            ),
            RetryOutcome::ConnectionError { source, .. } => {
                ValidationResult::indeterminate(identity.clone(), classify(&source))
            }
        };

        if let Some(error) = &result.error {
            tracing::warn!(%identity, attempts, %error, "Ledger check indeterminate");
        } else {
            tracing::debug!(%identity, attempts, exists = result.exists, "Ledger check complete");
        }
        result.with_attempts(attempts)
    }
}

impl IdentityValidator for LedgerClient {
    fn check<'a>(&'a self, identity: &'a Identity) -> CheckFut<'a> {
        Box::pin(self.check_identity(identity))
    }
}

fn classify(error: &reqwest::Error) -> RemoteError {
    let kind = if error.is_timeout() {
        RemoteErrorKind::Timeout
    } else if error.is_decode() {
        RemoteErrorKind::MalformedResponse
    } else {
        RemoteErrorKind::Transport
    };
    RemoteError::new(kind, error.to_string())
}

fn normalize_base_url(raw: &str) -> Result<String, LedgerError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: &str| LedgerError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| invalid("scheme must be http or https"))?;
    if rest.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok(trimmed.to_string())
}
