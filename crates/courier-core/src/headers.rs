//! Case-insensitive header map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header map with lower-cased names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Returns a copy with the header set.
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks up a header by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Removes a header by name, ignoring case.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    /// Returns a new map with `other` layered over `self`.
    #[must_use]
    pub fn merged(&self, other: &Headers) -> Headers {
        let mut merged = self.clone();
        for (name, value) in &other.0 {
            merged.0.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let headers = Headers::new().with("Retry-After", "3");
        assert_eq!(headers.get("retry-after"), Some("3"));
        assert_eq!(headers.get("RETRY-AFTER"), Some("3"));
    }

    #[test]
    fn test_merged_prefers_other() {
        let base: Headers = [("foo", "bar"), ("accept", "text/plain")].into_iter().collect();
        let overlay = Headers::new().with("Accept", "application/json");

        let merged = base.merged(&overlay);
        assert_eq!(merged.get("foo"), Some("bar"));
        assert_eq!(merged.get("accept"), Some("application/json"));
        assert_eq!(base.get("accept"), Some("text/plain"));
    }

    #[test]
    fn test_deserialize_lowercases_names() {
        let map: BTreeMap<String, String> = [("X-Token".to_string(), "abc".to_string())].into();
        let headers = Headers::from(map);
        assert_eq!(headers.iter().next(), Some(("x-token", "abc")));
    }
}
