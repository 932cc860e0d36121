use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::{ApiError, CallContext};

/// Token bucket shared by every call that consults it.
///
/// The bucket starts full. Each [`RateLimiter::wait`] takes one token,
/// sleeping until one is available.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill_at: Instant,
}

impl RateLimiter {
    /// Creates a limiter admitting `requests_per_second` on average with
    /// bursts of up to `burst` requests.
    ///
    /// Non-finite or non-positive rates fall back to one request per second;
    /// a zero burst is raised to one.
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        let requests_per_second = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        let burst = f64::from(burst.max(1));
        Self {
            requests_per_second,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill_at: Instant::now(),
            }),
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Blocks until a token is available or `ctx` is done.
    ///
    /// Fails immediately with [`ApiError::DeadlineExceeded`] when the
    /// required wait would outlast the context deadline. A token reserved
    /// for a wait that is cancelled is given back.
    pub async fn wait(&self, ctx: &CallContext) -> Result<(), ApiError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let now = Instant::now();
        let delay = self.reserve(now);
        if delay.is_zero() {
            return Ok(());
        }

        if ctx.deadline().is_some_and(|deadline| now + delay > deadline) {
            self.release();
            return Err(ApiError::DeadlineExceeded);
        }

        match ctx.run(sleep(delay)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// Takes a token, possibly driving the balance negative, and returns
    /// how long the caller must wait before that token exists.
    fn reserve(&self, now: Instant) -> Duration {
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(-bucket.tokens / self.requests_per_second)
    }

    fn release(&self) {
        let mut bucket = self.lock();
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if now <= bucket.last_refill_at {
            return;
        }
        let elapsed_secs = now.duration_since(bucket.last_refill_at).as_secs_f64();
        bucket.last_refill_at = now;
        bucket.tokens = (bucket.tokens + elapsed_secs * self.requests_per_second).min(self.burst);
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
