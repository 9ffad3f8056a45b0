//! Free-form string metadata attached to providers and disks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String-keyed, string-valued metadata
///
/// Iteration and display are ordered by key, so two `Meta` values with the
/// same pairs always render and compare identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meta(BTreeMap<String, String>);

impl Meta {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Get the value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact match on map lookup: `true` only if `key` is present and its
    /// value equals `value`. An absent key never matches, even for `""`.
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Meta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Meta(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Meta {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Meta {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, String>> for Meta {
    fn from(map: BTreeMap<String, String>) -> Self {
        Meta(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_sorted() {
        let meta = Meta::from_iter([("zone", "us-east-1a"), ("app", "db"), ("env", "prod")]);
        assert_eq!(meta.to_string(), "app=db,env=prod,zone=us-east-1a");
        assert_eq!(Meta::new().to_string(), "");
    }

    #[test]
    fn test_keys_sorted() {
        let meta = Meta::from_iter([("b", "2"), ("c", "3"), ("a", "1")]);
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_matches_exact_lookup() {
        let meta = Meta::from_iter([("zone", "us-east-1a"), ("empty", "")]);
        assert!(meta.matches("zone", "us-east-1a"));
        assert!(!meta.matches("zone", "us-west-2b"));
        assert!(meta.matches("empty", ""));
        assert!(!meta.matches("absent", ""));
        assert!(!meta.matches("absent", "x"));
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let mut a = Meta::new();
        a.insert("x", "1");
        a.insert("y", "2");
        let b = Meta::from_iter([("y", "2"), ("x", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_transparent() {
        let meta = Meta::from_iter([("k", "v")]);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"k":"v"}"#);
        let back: Meta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
