//! Page key type for stack identity.
//!
//! A page key is the server-relative path of a page (`/inbox`,
//! `/thread?id=7`). It is the identity of a stack entry, the cache key of
//! its response, and the staleness bucket for server responses.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Normalized page key.
///
/// Invariants:
/// - Always starts with `/`
/// - Never contains a fragment
/// - Query string is preserved (it is part of the page identity)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey(Arc<str>);

impl PageKey {
    /// Create from a raw path, normalizing the leading slash and dropping
    /// any `#fragment`.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);

        if without_fragment.is_empty() || without_fragment == "/" {
            return Self(Arc::from("/"));
        }

        if without_fragment.starts_with('/') {
            Self(Arc::from(without_fragment))
        } else {
            Self(Arc::from(format!("/{without_fragment}")))
        }
    }

    /// Root page key (`/`).
    pub fn root() -> Self {
        Self(Arc::from("/"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path portion, without the query string.
    pub fn path(&self) -> &str {
        self.0.split('?').next().unwrap_or(&self.0)
    }

    /// Resolve against a server base URL.
    ///
    /// The leading slash is stripped first so a base with a path prefix
    /// (`https://host/app/`) keeps its prefix.
    pub fn resolve(&self, base: &url::Url) -> Result<url::Url, url::ParseError> {
        base.join(self.0.trim_start_matches('/'))
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PageKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PageKey {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl Serialize for PageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PageKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(PageKey::new("").as_str(), "/");
        assert_eq!(PageKey::new("/").as_str(), "/");
        assert_eq!(PageKey::new("inbox").as_str(), "/inbox");
        assert_eq!(PageKey::new("/inbox#top").as_str(), "/inbox");
        assert_eq!(PageKey::new(" /a/b?x=1 ").as_str(), "/a/b?x=1");
    }

    #[test]
    fn test_path_strips_query() {
        assert_eq!(PageKey::new("/thread?id=7").path(), "/thread");
        assert_eq!(PageKey::new("/thread").path(), "/thread");
    }

    #[test]
    fn test_resolve_keeps_base_prefix() {
        let base = url::Url::parse("https://example.com/app/").unwrap();
        let url = PageKey::new("/inbox?x=1").resolve(&base).unwrap();
        assert_eq!(url.as_str(), "https://example.com/app/inbox?x=1");

        let root = PageKey::root().resolve(&base).unwrap();
        assert_eq!(root.as_str(), "https://example.com/app/");
    }

    #[test]
    fn test_serde_normalizes() {
        let key: PageKey = serde_json::from_str("\"settings\"").unwrap();
        assert_eq!(key.as_str(), "/settings");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"/settings\"");
    }
}
