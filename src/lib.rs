//! `api-executor` is a resilient async HTTP request executor.
//!
//! One call through [`ApiClient::execute`]:
//! - assembles the request (base URL join, query and header layering,
//!   body encoding through the configured [`Codec`]),
//! - waits on the shared [`RateLimiter`] before every attempt,
//! - retries transport failures and server errors with capped
//!   exponential backoff,
//! - optionally logs download progress,
//! - decodes the response into the caller's [`Output`].
//!
//! Every blocking point honors the caller's [`CallContext`].

mod backoff;
mod body;
mod client;
pub mod codec;
mod context;
mod decode;
mod error;
mod limiter;
mod options;
mod params;
mod progress;
mod wire;

pub use backoff::{default_needs_retry, Backoff, RetryPredicate};
pub use body::{DecodeTarget, Output, RequestBody, StructuredBody};
pub use client::ApiClient;
pub use codec::{Codec, JsonCodec};
pub use context::CallContext;
pub use error::ApiError;
pub use limiter::RateLimiter;
pub use options::ClientOptions;
pub use params::{CallArgs, Query};
pub use progress::Progress;

pub use reqwest::{header, Method, StatusCode};

pub type Result<T> = std::result::Result<T, ApiError>;
