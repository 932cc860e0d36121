use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::ApiError;

/// Cancellation and deadline scope governing one or more calls.
///
/// Every blocking point of a call (rate limiter wait, network attempt,
/// backoff sleep, body read) races against the token and the deadline.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a copy that expires `timeout` from now, or at the current
    /// deadline if that is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a copy that expires at `deadline`, or at the current
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns a copy governed by `token` instead of the current token.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The error this context currently resolves to, if it is done.
    pub fn err(&self) -> Option<ApiError> {
        if self.cancel.is_cancelled() {
            return Some(ApiError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ApiError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is cancelled or expires.
    pub async fn done(&self) -> ApiError {
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ApiError::Cancelled,
            _ = deadline => ApiError::DeadlineExceeded,
        }
    }

    /// Drives `fut` until it completes or the context is done.
    ///
    /// A context that is already done never polls `fut`.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ApiError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = fut => Ok(output),
        }
    }
}
