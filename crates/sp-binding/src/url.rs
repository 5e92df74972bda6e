//! Query parameters and namespace-aware REST paths

use sp_common::Namespace;

/// Ordered query/form parameters. Repeating a key is how the service
/// receives list values (`a=1&a=2`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    pub fn with_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.pairs.push((key.into(), value.to_string()));
    }

    /// Push one pair per value under the same key.
    pub fn push_list<I, V>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        for value in values {
            self.push(key, value);
        }
    }

    /// Replace every value of `key` with a single one.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.remove(key);
        self.push(key, value);
    }

    pub fn set_default(&mut self, key: &str, value: impl ToString) {
        if !self.contains(key) {
            self.push(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let first = self.get(key).map(str::to_string);
        self.pairs.retain(|(k, _)| k != key);
        first
    }

    pub fn extend(&mut self, other: Params) {
        self.pairs.extend(other.pairs);
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `application/x-www-form-urlencoded` rendering
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.push(key, value);
        }
        params
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Percent-encode one path segment (entity names may contain `/`, spaces, ...).
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Compose the absolute path for a REST resource.
///
/// - a path starting with `/` is already absolute and is returned as is
/// - with neither owner nor app: `/services/<path>`
/// - otherwise: `/servicesNS/<owner or nobody>/<app or system>/<path>`
pub fn abspath(path: &str, namespace: &Namespace) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }

    let (owner, app) = namespace.resolve();
    if owner.is_none() && app.is_none() {
        return format!("/services/{}", path);
    }

    let owner = owner.as_deref().unwrap_or("nobody");
    let app = app.as_deref().unwrap_or("system");
    format!(
        "/servicesNS/{}/{}/{}",
        encode_segment(owner),
        encode_segment(app),
        path
    )
}
