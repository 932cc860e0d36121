use reqwest::Method;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client options violate an invariant.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The request URL could not be resolved.
    #[error("invalid url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    /// The structured request body could not be encoded.
    #[error("marshal request body: {0}")]
    Marshal(String),
    /// A retry was needed but the stream body was already sent by an
    /// earlier attempt. `source` is the failure that asked for the retry.
    #[error(
        "{method} {url}: stream body was consumed by a previous attempt and cannot be resent{}",
        cause_suffix(.source)
    )]
    BodyNotReplayable {
        method: Method,
        url: String,
        #[source]
        source: Option<Box<ApiError>>,
    },
    /// The call context was cancelled.
    #[error("call cancelled")]
    Cancelled,
    /// The call context deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Waiting for a rate limiter token failed.
    #[error("rate limiter {method} {url}: {source}")]
    RateLimiter {
        method: Method,
        url: String,
        #[source]
        source: Box<ApiError>,
    },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Server error status with the raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// A final, non-retried failure of one call.
    #[error("{method} {url} failed: {source}")]
    Request {
        method: Method,
        url: String,
        #[source]
        source: Box<ApiError>,
    },
    /// The retry ceiling was reached; `source` is the last failure.
    #[error("{method} {url} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        method: Method,
        url: String,
        attempts: usize,
        #[source]
        source: Box<ApiError>,
    },
    /// Progress tracking was requested but the response has no size.
    #[error("track progress: cannot determine progress without Content-Length")]
    MissingContentLength { status: u16 },
    #[error("track progress: bad Content-Length {value:?}")]
    BadContentLength { status: u16, value: String },
    /// Reading the response body failed.
    #[error("read response body: {source}")]
    Body {
        status: u16,
        #[source]
        source: reqwest::Error,
    },
    /// Copying the response body into the caller's writer failed.
    #[error("write response body: {source}")]
    Write {
        status: u16,
        #[source]
        source: std::io::Error,
    },
    /// The response body could not be decoded into the result target.
    #[error("unmarshal response into expected type failed for: {body}: {message}")]
    Decode {
        status: u16,
        body: String,
        message: String,
    },
}

fn cause_suffix(source: &Option<Box<ApiError>>) -> String {
    source
        .as_ref()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}

impl ApiError {
    /// Status code of the response this error was produced from, if any.
    ///
    /// Decode and progress errors happen after a successful transport
    /// exchange, so they carry the status the server sent.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. }
            | Self::MissingContentLength { status }
            | Self::BadContentLength { status, .. }
            | Self::Body { status, .. }
            | Self::Write { status, .. }
            | Self::Decode { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::RateLimiter { source, .. }
            | Self::Request { source, .. }
            | Self::RetriesExhausted { source, .. } => source.status(),
            Self::BodyNotReplayable { source, .. } => {
                source.as_ref().and_then(|source| source.status())
            }
            _ => None,
        }
    }

    /// Whether the call stopped because its context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    /// Whether the call stopped because its context deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.root(), Self::DeadlineExceeded)
    }

    fn root(&self) -> &ApiError {
        match self {
            Self::RateLimiter { source, .. }
            | Self::Request { source, .. }
            | Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}
