use reqwest::header::HeaderMap;

/// Ordered, multi-valued query parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter, keeping earlier values for the same key.
    pub fn append(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Layers `other` on top: every key present in `other` loses all of
    /// its values here before `other`'s values are appended.
    pub fn overlay(&mut self, other: &Query) {
        self.0
            .retain(|(name, _)| !other.0.iter().any(|(key, _)| key == name));
        self.0.extend(other.0.iter().cloned());
    }
}

impl<K, V> FromIterator<(K, V)> for Query
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Query
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Optional per-call arguments.
///
/// Per-call values take precedence over the client's defaults.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    pub(crate) query: Query,
    pub(crate) headers: HeaderMap,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<Query>) -> Self {
        self.query.overlay(&query.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        crate::wire::overlay_headers(&mut self.headers, &headers);
        self
    }
}

impl From<()> for CallArgs {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Query> for CallArgs {
    fn from(query: Query) -> Self {
        Self::default().with_query(query)
    }
}

impl From<HeaderMap> for CallArgs {
    fn from(headers: HeaderMap) -> Self {
        Self::default().with_headers(headers)
    }
}

impl From<(Query, HeaderMap)> for CallArgs {
    fn from((query, headers): (Query, HeaderMap)) -> Self {
        Self::default().with_query(query).with_headers(headers)
    }
}
