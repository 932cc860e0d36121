use crate::ApiError;

/// Configures timeout, retry, connection and progress behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Call timeout in milliseconds, used when the caller's context has no deadline.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_wait_min_ms: u64,
    /// Upper bound for a single backoff delay in milliseconds.
    pub retry_wait_max_ms: u64,
    /// Keep connections alive between calls. When `false` every request
    /// asks the server to close the connection after use.
    pub recycle_connection: bool,
    /// Report download progress while decoding response bodies.
    pub track_progress: bool,
    /// Media type sent as `Accept` and `Content-Type`. Empty disables both.
    pub content_format: String,
    /// Interval between progress log lines in milliseconds.
    pub progress_interval_ms: u64,
}

impl ClientOptions {
    /// Checks the backoff invariants.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.retry_wait_min_ms == 0 {
            return Err(ApiError::Config(
                "retry_wait_min_ms must be greater than zero".to_owned(),
            ));
        }
        if self.retry_wait_min_ms > self.retry_wait_max_ms {
            return Err(ApiError::Config(format!(
                "retry_wait_min_ms ({}) must not exceed retry_wait_max_ms ({})",
                self.retry_wait_min_ms, self.retry_wait_max_ms
            )));
        }
        if self.progress_interval_ms == 0 {
            return Err(ApiError::Config(
                "progress_interval_ms must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 60 * 60 * 1_000,
            max_retries: 3,
            retry_wait_min_ms: 500,
            retry_wait_max_ms: 2_000,
            recycle_connection: true,
            track_progress: false,
            content_format: "application/json".to_owned(),
            progress_interval_ms: 1_000,
        }
    }
}
