use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::{ApiError, ClientOptions};

/// Decides whether an attempt outcome is retryable.
///
/// Receives the response, if one was obtained, and the attempt error, if
/// there was one. Exactly one of them is `Some`.
pub type RetryPredicate = Arc<dyn Fn(Option<&Response>, Option<&ApiError>) -> bool + Send + Sync>;

/// Retries any error except cancellation and deadline expiry, and any
/// server error status.
pub fn default_needs_retry(response: Option<&Response>, err: Option<&ApiError>) -> bool {
    let retryable_error = err.is_some_and(|err| !err.is_cancelled() && !err.is_deadline_exceeded());
    let server_error = response.is_some_and(|response| {
        response.status() >= StatusCode::INTERNAL_SERVER_ERROR
    });
    retryable_error || server_error
}

/// Exponential delay between attempts, capped at `wait_max`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backoff {
    wait_min: Duration,
    wait_max: Duration,
}

impl Backoff {
    pub fn new(wait_min: Duration, wait_max: Duration) -> Self {
        Self { wait_min, wait_max }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(
            Duration::from_millis(options.retry_wait_min_ms),
            Duration::from_millis(options.retry_wait_max_ms),
        )
    }

    /// Delay before retry number `retry` (1-based): `wait_min * 2^retry`,
    /// capped at `wait_max`.
    pub fn delay(&self, retry: usize) -> Duration {
        let wait_min = self.wait_min.as_nanos();
        if wait_min == 0 {
            return Duration::ZERO;
        }
        let scaled = u32::try_from(retry)
            .ok()
            .and_then(|exp| 2u128.checked_pow(exp))
            .and_then(|multiplier| wait_min.checked_mul(multiplier));
        match scaled {
            Some(nanos) if nanos < self.wait_max.as_nanos() => from_nanos(nanos),
            _ => self.wait_max,
        }
    }
}

fn from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    // Callers stay below a `Duration`, so the seconds fit in a u64.
    Duration::new((nanos / NANOS_PER_SEC) as u64, (nanos % NANOS_PER_SEC) as u32)
}
