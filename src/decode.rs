use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use reqwest::Response;
use tokio::io::AsyncWriteExt;

use crate::{codec::Codec, ApiError, CallContext, Output};

const LOGGED_BODY_PREFIX: usize = 48;

/// Response body reader that counts the bytes it hands out.
pub(crate) struct BodyStream {
    response: Response,
    status: u16,
    read: Arc<AtomicU64>,
}

impl BodyStream {
    pub fn new(response: Response) -> Self {
        let status = response.status().as_u16();
        Self {
            response,
            status,
            read: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Shared byte counter, updated on every chunk read.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.read)
    }

    async fn next_chunk(&mut self, ctx: &CallContext) -> Result<Option<Bytes>, ApiError> {
        let chunk = ctx
            .run(self.response.chunk())
            .await?
            .map_err(|source| ApiError::Body {
                status: self.status,
                source,
            })?;
        if let Some(chunk) = &chunk {
            self.read.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        Ok(chunk)
    }

    async fn read_all(&mut self, ctx: &CallContext) -> Result<Vec<u8>, ApiError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.next_chunk(ctx).await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Reads and drops whatever is left so the connection can be reused.
    pub async fn drain(mut self, ctx: &CallContext) {
        while let Ok(Some(_)) = self.next_chunk(ctx).await {}
    }
}

/// Reads and drops the rest of a response body.
pub(crate) async fn drain(response: Response, ctx: &CallContext) {
    BodyStream::new(response).drain(ctx).await;
}

/// Reads the body of a server error response for error reporting.
pub(crate) async fn error_body(response: Response, ctx: &CallContext) -> String {
    let mut body = BodyStream::new(response);
    match body.read_all(ctx).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => format!("<unreadable body: {err}>"),
    }
}

/// Moves the body into `output`, then drains anything left over.
pub(crate) async fn read_response(
    ctx: &CallContext,
    codec: &dyn Codec,
    mut body: BodyStream,
    output: Output<'_>,
) -> Result<(), ApiError> {
    let status = body.status;
    let result = match output {
        Output::Discard => Ok(()),
        Output::Bytes(buffer) => body.read_all(ctx).await.map(|bytes| {
            log_body(&bytes);
            *buffer = bytes;
        }),
        Output::Writer(writer) => copy_into(ctx, &mut body, writer).await,
        Output::Decode(target) => match body.read_all(ctx).await {
            Ok(bytes) => {
                log_body(&bytes);
                codec
                    .unmarshal(&bytes)
                    .map_err(|err| err.to_string())
                    .and_then(|value| target.assign(value).map_err(|err| err.to_string()))
                    .map_err(|message| ApiError::Decode {
                        status,
                        body: String::from_utf8_lossy(&bytes).into_owned(),
                        message,
                    })
            }
            Err(err) => Err(err),
        },
    };
    body.drain(ctx).await;
    result
}

async fn copy_into(
    ctx: &CallContext,
    body: &mut BodyStream,
    writer: &mut (dyn tokio::io::AsyncWrite + Unpin + Send),
) -> Result<(), ApiError> {
    let status = body.status;
    while let Some(chunk) = body.next_chunk(ctx).await? {
        ctx.run(writer.write_all(&chunk))
            .await?
            .map_err(|source| ApiError::Write { status, source })?;
    }
    ctx.run(writer.flush())
        .await?
        .map_err(|source| ApiError::Write { status, source })
}

fn log_body(body: &[u8]) {
    let end = body.len().min(LOGGED_BODY_PREFIX);
    let suffix = if body.len() > LOGGED_BODY_PREFIX { "..." } else { "" };
    tracing::debug!(
        "response body: {}{}",
        String::from_utf8_lossy(&body[..end]),
        suffix
    );
}
