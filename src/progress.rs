use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{ApiError, CallContext};

/// Snapshot of a download in flight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    pub read: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.read as f64 / self.total as f64 * 100.0).min(100.0)
    }

    /// Estimated time left, extrapolated from throughput so far.
    ///
    /// `None` until at least one byte has been read.
    pub fn remaining(&self) -> Option<Duration> {
        if self.read >= self.total {
            return Some(Duration::ZERO);
        }
        if self.read == 0 {
            return None;
        }
        let ratio = self.read as f64 / self.total as f64;
        let estimated = self.elapsed.as_secs_f64() / ratio;
        let left = (estimated - self.elapsed.as_secs_f64()).max(0.0);
        Some(Duration::try_from_secs_f64(left).unwrap_or(Duration::MAX))
    }
}

/// Parses the declared body size required for progress reporting.
pub(crate) fn content_length(headers: &HeaderMap, status: u16) -> Result<u64, ApiError> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or(ApiError::MissingContentLength { status })?;
    let text = value.to_str().map_err(|_| ApiError::BadContentLength {
        status,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::BadContentLength {
            status,
            value: text.to_owned(),
        })
}

/// Background task logging how much of a body is left to read.
pub(crate) struct ProgressReporter {
    finished: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Starts reporting on `counter` every `interval` until the counter
    /// reaches `total`, `ctx` is done, or [`ProgressReporter::finish`] is called.
    pub fn spawn(ctx: &CallContext, counter: Arc<AtomicU64>, total: u64, interval: Duration) -> Self {
        let finished = CancellationToken::new();
        let stop = finished.clone();
        let ctx = ctx.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval_at(started + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let report = async {
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => {
                            let progress = Progress {
                                read: counter.load(Ordering::Relaxed),
                                total,
                                elapsed: started.elapsed(),
                            };
                            tracing::info!(
                                read = progress.read,
                                total = progress.total,
                                percent = progress.percent(),
                                remaining = ?progress.remaining().map(round_to_secs),
                                "download progress"
                            );
                            if progress.read >= total {
                                break;
                            }
                        }
                    }
                }
            };
            let _ = ctx.run(report).await;
        });

        Self { finished, handle }
    }

    /// Stops the reporter and waits for it to exit.
    pub async fn finish(self) {
        self.finished.cancel();
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "progress reporter task failed");
        }
    }
}

fn round_to_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs_f64().round() as u64)
}
