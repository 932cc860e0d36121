use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONNECTION},
    Method,
};
use url::Url;

use crate::{codec::Codec, ApiError, Query, RequestBody};

/// Request body as stored between attempts.
#[derive(Debug)]
pub(crate) enum WireBody {
    Empty,
    Bytes(Bytes),
    /// `None` once the stream has been handed to an attempt.
    Stream(Option<reqwest::Body>),
}

/// Everything needed to build one wire request, resolved once per call.
#[derive(Debug)]
pub(crate) struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: WireBody,
}

impl RequestDescriptor {
    /// Whether another attempt can still carry the body.
    pub fn is_replayable(&self) -> bool {
        !matches!(self.body, WireBody::Stream(None))
    }

    /// Builds a fresh `reqwest` request for the next attempt.
    pub fn build(
        &mut self,
        http: &reqwest::Client,
        recycle_connection: bool,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let mut headers = self.headers.clone();
        if !recycle_connection {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let builder = http
            .request(self.method.clone(), self.url.clone())
            .headers(headers);

        Ok(match &mut self.body {
            WireBody::Empty => builder,
            WireBody::Bytes(bytes) => builder.body(bytes.clone()),
            WireBody::Stream(stream) => {
                let stream = stream.take().ok_or_else(|| ApiError::BodyNotReplayable {
                    method: self.method.clone(),
                    url: self.url.to_string(),
                    source: None,
                })?;
                builder.body(stream)
            }
        })
    }
}

/// Resolves `path` against `base_url` and applies `query` on top of any
/// query already present in the URL.
pub(crate) fn resolve_url(base_url: &str, path: &str, query: &Query) -> Result<Url, ApiError> {
    let text = if is_absolute(path) {
        path.to_owned()
    } else {
        join_base_path(base_url, path)
    };

    let mut url = Url::parse(&text).map_err(|source| ApiError::Url {
        url: text.clone(),
        source,
    })?;

    if !query.is_empty() {
        let mut merged: Query = url.query_pairs().into_owned().collect();
        merged.overlay(query);
        url.query_pairs_mut()
            .clear()
            .extend_pairs(merged.pairs().iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(url)
}

fn is_absolute(path: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        path.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = path.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}

/// Layers `layer` on top of `target`: every header name present in
/// `layer` loses all of its values in `target` first.
pub(crate) fn overlay_headers(target: &mut HeaderMap, layer: &HeaderMap) {
    for name in layer.keys() {
        target.remove(name);
        for value in layer.get_all(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

/// Turns a [`RequestBody`] into the form kept across attempts.
pub(crate) fn encode_body(body: RequestBody, codec: &dyn Codec) -> Result<WireBody, ApiError> {
    Ok(match body {
        RequestBody::Empty => WireBody::Empty,
        RequestBody::Bytes(bytes) => WireBody::Bytes(bytes),
        RequestBody::Stream(stream) => WireBody::Stream(Some(stream)),
        RequestBody::Structured(value) => {
            let value = value
                .to_value()
                .map_err(|err| ApiError::Marshal(err.to_string()))?;
            let bytes = codec
                .marshal(&value)
                .map_err(|err| ApiError::Marshal(err.to_string()))?;
            WireBody::Bytes(bytes.into())
        }
    })
}
