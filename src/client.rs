use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method, Response, StatusCode,
};
use tokio::time::sleep;

use crate::{
    backoff::{default_needs_retry, Backoff, RetryPredicate},
    codec::{Codec, JsonCodec},
    decode::{self, BodyStream},
    progress::{self, ProgressReporter},
    wire::{self, RequestDescriptor},
    ApiError, CallArgs, CallContext, ClientOptions, Output, Query, RateLimiter, RequestBody,
    Result,
};

#[derive(Clone)]
/// Resilient HTTP request executor.
///
/// Every call follows the same steps: assemble the request, then
/// loop over rate limiter wait, one network attempt and the retry decision,
/// then decode the final response into the caller's [`Output`].
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    request_headers: HeaderMap,
    query: Query,
    options: ClientOptions,
    limiter: Option<Arc<RateLimiter>>,
    codec: Arc<dyn Codec>,
    needs_retry: RetryPredicate,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("request_headers", &RedactedHeaders(&self.request_headers))
            .field("query", &self.query)
            .field("options", &self.options)
            .field("limiter", &self.limiter)
            .finish()
    }
}

struct RedactedHeaders<'a>(&'a HeaderMap);

impl fmt::Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(name, value)| {
                let shown = if *name == AUTHORIZATION || value.is_sensitive() {
                    "<redacted>"
                } else {
                    value.to_str().unwrap_or("<binary>")
                };
                (name.as_str(), shown)
            }))
            .finish()
    }
}

enum RetryState {
    Attempting,
    Evaluating(Result<Response>),
    Retrying(Duration),
    Done(Result<Response>),
}

impl ApiClient {
    /// Creates a client resolving relative paths against `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            headers: HeaderMap::new(),
            request_headers: HeaderMap::new(),
            query: Query::new(),
            options: ClientOptions::default(),
            limiter: None,
            codec: Arc::new(JsonCodec),
            needs_retry: Arc::new(default_needs_retry),
        }
    }

    /// Creates a client from the `API_EXECUTOR_BASE_URL` environment variable.
    ///
    /// Returns an error if the variable is missing or empty.
    pub fn from_env() -> std::result::Result<Self, String> {
        let base_url = std::env::var("API_EXECUTOR_BASE_URL")
            .map_err(|_| "missing API_EXECUTOR_BASE_URL environment variable".to_owned())?;
        if base_url.trim().is_empty() {
            return Err("API_EXECUTOR_BASE_URL is set but empty".to_owned());
        }
        Ok(Self::new(base_url.trim()))
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Uses a preconfigured transport (proxies, TLS, pooling).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Adds a default header sent with every call.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Layers default headers sent with every call.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        wire::overlay_headers(&mut self.headers, &headers);
        self
    }

    /// Stages headers that override the defaults for calls made through
    /// the returned client. Per-call headers still take precedence.
    pub fn with_request_headers(mut self, headers: HeaderMap) -> Self {
        wire::overlay_headers(&mut self.request_headers, &headers);
        self
    }

    /// Adds default query parameters sent with every call.
    pub fn with_query(mut self, query: impl Into<Query>) -> Self {
        self.query.overlay(&query.into());
        self
    }

    /// Consults `limiter` before every attempt, retries included.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Replaces the marshal/unmarshal pair used for structured bodies.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the retryable-outcome predicate.
    pub fn with_retry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&Response>, Option<&ApiError>) -> bool + Send + Sync + 'static,
    {
        self.needs_retry = Arc::new(predicate);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a GET request and decodes the response into `output`.
    pub async fn get(&self, ctx: &CallContext, path: &str, output: Output<'_>) -> Result<StatusCode> {
        self.execute(ctx, Method::GET, path, (), output, ()).await
    }

    /// Sends a POST request and decodes the response into `output`.
    pub async fn post<B: Into<RequestBody>>(
        &self,
        ctx: &CallContext,
        path: &str,
        body: B,
        output: Output<'_>,
    ) -> Result<StatusCode> {
        self.execute(ctx, Method::POST, path, body, output, ()).await
    }

    /// Executes one logical call.
    ///
    /// `path` is joined onto the base URL unless it is already absolute.
    /// Transport errors and server error statuses are retried with
    /// exponential backoff up to `max_retries` times. Any other status is
    /// final and its body is decoded into `output`; the status is returned
    /// as-is, so a 404 is `Ok(StatusCode::NOT_FOUND)`.
    ///
    /// When the context has no deadline, `timeout_ms` applies.
    pub async fn execute<B, A>(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        body: B,
        output: Output<'_>,
        args: A,
    ) -> Result<StatusCode>
    where
        B: Into<RequestBody>,
        A: Into<CallArgs>,
    {
        self.options.validate()?;
        let ctx = match ctx.deadline() {
            Some(_) => ctx.clone(),
            None => ctx.with_timeout(Duration::from_millis(self.options.timeout_ms)),
        };

        let mut descriptor = self.assemble(method, path, body.into(), args.into())?;
        let response = self.run_with_retry(&ctx, &mut descriptor).await?;
        let status = response.status();

        let body = BodyStream::new(response);
        let reporter = if self.options.track_progress && !output.is_discard() {
            match progress::content_length(body.response().headers(), status.as_u16()) {
                Ok(total) => Some(ProgressReporter::spawn(
                    &ctx,
                    body.counter(),
                    total,
                    Duration::from_millis(self.options.progress_interval_ms),
                )),
                Err(err) => {
                    body.drain(&ctx).await;
                    return Err(self.annotate(&descriptor, err));
                }
            }
        } else {
            None
        };

        let result = decode::read_response(&ctx, self.codec.as_ref(), body, output).await;
        if let Some(reporter) = reporter {
            reporter.finish().await;
        }
        result
            .map(|()| status)
            .map_err(|err| self.annotate(&descriptor, err))
    }

    /// Builds the request descriptor for one call.
    fn assemble(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        args: CallArgs,
    ) -> Result<RequestDescriptor> {
        let mut query = self.query.clone();
        query.overlay(&args.query);
        let url = wire::resolve_url(&self.base_url, path, &query)?;

        let mut headers = self.format_headers();
        wire::overlay_headers(&mut headers, &self.headers);
        wire::overlay_headers(&mut headers, &self.request_headers);
        wire::overlay_headers(&mut headers, &args.headers);

        let body = wire::encode_body(body, self.codec.as_ref()).map_err(|err| ApiError::Request {
            method: method.clone(),
            url: url.to_string(),
            source: Box::new(err),
        })?;

        Ok(RequestDescriptor {
            method,
            url,
            headers,
            body,
        })
    }

    fn format_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.options.content_format.is_empty() {
            return headers;
        }
        match HeaderValue::from_str(&self.options.content_format) {
            Ok(value) => {
                headers.insert(ACCEPT, value.clone());
                headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => {
                tracing::warn!(
                    content_format = %self.options.content_format,
                    "content format is not a valid header value, skipping"
                );
            }
        }
        headers
    }

    async fn run_with_retry(
        &self,
        ctx: &CallContext,
        descriptor: &mut RequestDescriptor,
    ) -> Result<Response> {
        let backoff = Backoff::from_options(&self.options);
        let mut attempts = 0usize;
        let mut retries = 0usize;
        let mut state = RetryState::Attempting;

        loop {
            state = match state {
                RetryState::Attempting => {
                    self.wait_for_token(ctx, descriptor).await?;
                    let request = descriptor.build(&self.http, self.options.recycle_connection)?;
                    attempts += 1;
                    RetryState::Evaluating(self.attempt(ctx, descriptor, request).await)
                }
                RetryState::Evaluating(outcome) => {
                    let (response, err) = match &outcome {
                        Ok(response) => (Some(response), None),
                        Err(err) => (None, Some(err)),
                    };
                    if !(self.needs_retry)(response, err) {
                        RetryState::Done(outcome)
                    } else if retries >= self.options.max_retries {
                        let last = last_error(outcome, ctx).await;
                        tracing::warn!(
                            method = %descriptor.method,
                            url = %descriptor.url,
                            attempts,
                            error = %last,
                            "giving up on request"
                        );
                        return Err(ApiError::RetriesExhausted {
                            method: descriptor.method.clone(),
                            url: descriptor.url.to_string(),
                            attempts,
                            source: Box::new(last),
                        });
                    } else if !descriptor.is_replayable() {
                        let last = last_error(outcome, ctx).await;
                        tracing::warn!(
                            method = %descriptor.method,
                            url = %descriptor.url,
                            attempts,
                            error = %last,
                            "stream body already sent, not retrying"
                        );
                        return Err(ApiError::BodyNotReplayable {
                            method: descriptor.method.clone(),
                            url: descriptor.url.to_string(),
                            source: Some(Box::new(last)),
                        });
                    } else {
                        let status = match outcome {
                            Ok(response) => {
                                let status = response.status().as_u16();
                                decode::drain(response, ctx).await;
                                Some(status)
                            }
                            Err(err) => {
                                tracing::info!(error = %err, "request attempt failed");
                                None
                            }
                        };
                        retries += 1;
                        let delay = backoff.delay(retries);
                        tracing::info!(
                            method = %descriptor.method,
                            url = %descriptor.url,
                            retry = retries,
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "retrying request"
                        );
                        RetryState::Retrying(delay)
                    }
                }
                RetryState::Retrying(delay) => {
                    ctx.run(sleep(delay))
                        .await
                        .map_err(|err| self.annotate(descriptor, err))?;
                    RetryState::Attempting
                }
                RetryState::Done(outcome) => {
                    return outcome.map_err(|err| self.annotate(descriptor, err));
                }
            };
        }
    }

    async fn wait_for_token(&self, ctx: &CallContext, descriptor: &RequestDescriptor) -> Result<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter
            .wait(ctx)
            .await
            .map_err(|err| ApiError::RateLimiter {
                method: descriptor.method.clone(),
                url: descriptor.url.to_string(),
                source: Box::new(err),
            })
    }

    /// One network attempt with a freshly built request.
    async fn attempt(
        &self,
        ctx: &CallContext,
        descriptor: &RequestDescriptor,
        request: reqwest::RequestBuilder,
    ) -> Result<Response> {
        tracing::debug!(method = %descriptor.method, url = %descriptor.url, "sending request");
        ctx.run(request.send())
            .await?
            .map_err(ApiError::Transport)
    }

    fn annotate(&self, descriptor: &RequestDescriptor, err: ApiError) -> ApiError {
        ApiError::Request {
            method: descriptor.method.clone(),
            url: descriptor.url.to_string(),
            source: Box::new(err),
        }
    }
}

/// Turns a retryable outcome into the error reported when no retry follows.
async fn last_error(outcome: Result<Response>, ctx: &CallContext) -> ApiError {
    match outcome {
        Ok(response) => ApiError::Http {
            status: response.status().as_u16(),
            body: decode::error_body(response, ctx).await,
        },
        Err(err) => err,
    }
}
