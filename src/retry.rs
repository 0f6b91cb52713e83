//! Retry policies for the request pipeline.

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::error::ApiError;

/// Default maximum number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 4;
/// Default base duration for backoff computation.
pub const DEFAULT_BASE: Duration = Duration::from_secs(1);

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry { wait: Duration },
    Stop,
}

/// Decides whether a failed attempt should be retried and how long to wait.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    fn decide(&self, error: &ApiError, attempt: u32) -> RetryAction;
}

enum Classification {
    Retryable,
    RetryAfter(Duration),
    Fatal,
}

fn classify(error: &ApiError) -> Classification {
    if let Some(code) = error.service_code() {
        if code.starts_with("RequestLimitExceeded") {
            return Classification::Retryable;
        }
        if let Some(context) = error.context() {
            let retry_after = context
                .headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            if let Some(seconds) = retry_after {
                return Classification::RetryAfter(Duration::from_secs(seconds));
            }
        }
        if code == "InternalError" {
            return Classification::Retryable;
        }
        return Classification::Fatal;
    }
    if let ApiError::Http(e) = error {
        if cfg!(debug_assertions) && is_connection_closed(e) {
            return Classification::Retryable;
        }
    }
    Classification::Fatal
}

/// True when the transport reports the remote end closing the connection
/// mid-exchange.
fn is_connection_closed(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        let rendered = cause.to_string();
        if rendered.contains("connection closed") || rendered.contains("IncompleteMessage") {
            return true;
        }
        source = cause.source();
    }
    false
}

fn exponential_wait(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(31))
}

/// Retries with `base * 2^attempt` waits.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn decide(&self, error: &ApiError, attempt: u32) -> RetryAction {
        if attempt >= self.max_retries {
            return RetryAction::Stop;
        }
        match classify(error) {
            Classification::Retryable => RetryAction::Retry {
                wait: exponential_wait(self.base, attempt),
            },
            Classification::RetryAfter(wait) => RetryAction::Retry { wait },
            Classification::Fatal => RetryAction::Stop,
        }
    }
}

/// Retries with waits drawn uniformly from
/// `[base * 2^attempt / 2, base * 2^attempt)`, smoothing thundering-herd
/// retries. This is the default policy.
#[derive(Debug, Clone)]
pub struct JitteredExponentialBackoff {
    pub base: Duration,
    pub max_retries: u32,
}

impl Default for JitteredExponentialBackoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy for JitteredExponentialBackoff {
    fn decide(&self, error: &ApiError, attempt: u32) -> RetryAction {
        if attempt >= self.max_retries {
            return RetryAction::Stop;
        }
        match classify(error) {
            Classification::Retryable => {
                let upper = exponential_wait(self.base, attempt).as_nanos() as u64;
                let wait = rand::thread_rng().gen_range(upper / 2..upper.max(1));
                RetryAction::Retry {
                    wait: Duration::from_nanos(wait),
                }
            }
            Classification::RetryAfter(wait) => RetryAction::Retry { wait },
            Classification::Fatal => RetryAction::Stop,
        }
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn decide(&self, _error: &ApiError, _attempt: u32) -> RetryAction {
        RetryAction::Stop
    }
}
