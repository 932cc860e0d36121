use std::fmt;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::io::ReaderStream;

/// Request payload, classified once when the call is made.
pub enum RequestBody {
    /// No body.
    Empty,
    /// Already-encoded bytes, sent verbatim.
    Bytes(Bytes),
    /// A byte stream, sent verbatim. It can be sent only once.
    Stream(reqwest::Body),
    /// A value encoded with the client's codec.
    Structured(Box<dyn StructuredBody>),
}

impl RequestBody {
    /// Wraps a reader as a streaming body.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::Stream(reqwest::Body::wrap_stream(ReaderStream::new(reader)))
    }

    /// Wraps any serializable value; encoding happens when the call is assembled.
    pub fn structured<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::Structured(Box::new(value))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Structured(_) => f.write_str("Structured"),
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Bytes(text.into())
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<reqwest::Body> for RequestBody {
    fn from(body: reqwest::Body) -> Self {
        Self::Stream(body)
    }
}

/// A request value that can be converted into the codec data model.
pub trait StructuredBody: Send + Sync {
    fn to_value(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> StructuredBody for T
where
    T: Serialize + Send + Sync,
{
    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// A result value that can be overwritten from the codec data model.
pub trait DecodeTarget {
    fn assign(&mut self, value: serde_json::Value) -> serde_json::Result<()>;
}

impl<T> DecodeTarget for T
where
    T: DeserializeOwned,
{
    fn assign(&mut self, value: serde_json::Value) -> serde_json::Result<()> {
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

/// Where the response body goes.
pub enum Output<'a> {
    /// Drain and drop the body.
    Discard,
    /// Copy the raw body into the buffer, replacing its contents.
    Bytes(&'a mut Vec<u8>),
    /// Copy the raw body into the writer.
    Writer(&'a mut (dyn AsyncWrite + Unpin + Send)),
    /// Unmarshal the body with the client's codec.
    Decode(&'a mut (dyn DecodeTarget + Send)),
}

impl<'a> Output<'a> {
    pub fn decode<T>(target: &'a mut T) -> Self
    where
        T: DeserializeOwned + Send,
    {
        Self::Decode(target)
    }

    pub fn bytes(buffer: &'a mut Vec<u8>) -> Self {
        Self::Bytes(buffer)
    }

    pub fn writer<W>(writer: &'a mut W) -> Self
    where
        W: AsyncWrite + Unpin + Send,
    {
        Self::Writer(writer)
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Self::Discard)
    }
}

impl fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discard => "Discard",
            Self::Bytes(_) => "Bytes",
            Self::Writer(_) => "Writer",
            Self::Decode(_) => "Decode",
        })
    }
}
