//! Key Builder Module
//!
//! Deterministic, colon-delimited key layout:
//! `<prefix>:<domain>:<type>:<identifier or hash>`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Hex characters kept from each digest.
const HASH_LEN: usize = 16;

// == Key Builder ==
/// Builds hierarchical cache keys. Holds only the prefix; no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Joins the prefix and components with `:`. Empty components are skipped.
    pub fn build<S: AsRef<str>>(&self, components: &[S]) -> String {
        std::iter::once(self.prefix.as_str())
            .chain(components.iter().map(|c| c.as_ref()))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// `app:recipe:123`
    pub fn entity(&self, domain: &str, id: impl std::fmt::Display) -> String {
        let id = id.to_string();
        self.build(&[domain, id.as_str()])
    }

    /// `app:search:q<hash>:f<hash>`
    pub fn search<K, V>(&self, query: &str, filters: &[(K, V)]) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let q = format!("q{}", hash_str(&query.trim().to_lowercase()));
        let f = format!("f{}", hash_filters(filters));
        self.build(&["search", q.as_str(), f.as_str()])
    }

    /// `app:tag:<name>`
    pub fn tag(&self, name: &str) -> String {
        self.build(&["tag", name])
    }

    /// `app:<domain>:*`, suitable for pattern invalidation on both layers.
    pub fn domain_pattern(&self, domain: &str) -> String {
        self.build(&[domain, "*"])
    }
}

/// Canonicalizes a filter set and hashes it.
///
/// Keys are sorted and values URL-escaped before hashing, so the same set
/// in any order yields the same hash. Duplicate keys keep the last value.
pub fn hash_filters<K, V>(filters: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<&str, &str> = filters
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();

    let canonical = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    hash_str(&canonical)
}

/// Truncated hex SHA-256 of `input`.
pub fn hash_str(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key() {
        let keys = KeyBuilder::new("app");
        assert_eq!(keys.entity("recipe", 123), "app:recipe:123");
    }

    #[test]
    fn test_build_skips_empty_components() {
        let keys = KeyBuilder::new("app");
        assert_eq!(keys.build(&["a", "", "b"]), "app:a:b");
    }

    #[test]
    fn test_tag_and_pattern() {
        let keys = KeyBuilder::new("app");
        assert_eq!(keys.tag("recipes"), "app:tag:recipes");
        assert_eq!(keys.domain_pattern("recipe"), "app:recipe:*");
    }

    #[test]
    fn test_filter_hash_is_order_independent() {
        let a = hash_filters(&[("cuisine", "thai"), ("time", "30")]);
        let b = hash_filters(&[("time", "30"), ("cuisine", "thai")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_LEN);
    }

    #[test]
    fn test_filter_values_are_escaped() {
        // Without escaping both would canonicalize to "a=1&b=2"
        let joined = hash_filters(&[("a", "1&b=2")]);
        let split = hash_filters(&[("a", "1"), ("b", "2")]);
        assert_ne!(joined, split);
    }

    #[test]
    fn test_search_key_layout() {
        let keys = KeyBuilder::new("app");
        let key = keys.search("Pad Thai", &[("diet", "vegan")]);
        let parts: Vec<&str> = key.split(':').collect();

        assert_eq!(parts[0], "app");
        assert_eq!(parts[1], "search");
        assert!(parts[2].starts_with('q'));
        assert!(parts[3].starts_with('f'));
        assert_eq!(key, keys.search("  pad thai ", &[("diet", "vegan")]));
    }

    #[test]
    fn test_empty_filters_are_stable() {
        let none: [(&str, &str); 0] = [];
        assert_eq!(hash_filters(&none), hash_filters(&none));
    }
}
