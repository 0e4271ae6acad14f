//! Cached response metadata.

use serde::{Deserialize, Serialize};

/// Metadata of one cached response.
///
/// Stored as the `.meta.json` half of a cache entry; the payload lives in
/// the matching `.body` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Cache key (page key or request URL)
    pub url: String,
    /// Validation token sent back as `If-None-Match`
    #[serde(default)]
    pub etag: Option<String>,
    /// UNIX seconds after which the entry must not be used
    pub expires_at: u64,
    /// UNIX seconds after which the entry should be revalidated
    #[serde(default)]
    pub refresh_at: u64,
    /// UNIX seconds when the entry was written
    #[serde(default)]
    pub stored_at: u64,
    /// Payload length in bytes (detects torn writes)
    #[serde(default)]
    pub len: u64,
}

/// How usable an entry is at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Use without contacting the server.
    Fresh,
    /// Show, then revalidate.
    Stale,
    /// Do not use.
    Expired,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, expires_at: u64) -> Self {
        Self {
            url: url.into(),
            etag: None,
            expires_at,
            refresh_at: expires_at,
            stored_at: crate::core::unix_now(),
            len: 0,
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_refresh_at(mut self, refresh_at: u64) -> Self {
        self.refresh_at = refresh_at.min(self.expires_at);
        self
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn freshness(&self, now: u64) -> Freshness {
        if self.is_expired(now) {
            Freshness::Expired
        } else if now >= self.refresh_at {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_windows() {
        let meta = CachedResponse::new("/a", 200).with_refresh_at(100);
        assert_eq!(meta.freshness(50), Freshness::Fresh);
        assert_eq!(meta.freshness(100), Freshness::Stale);
        assert_eq!(meta.freshness(199), Freshness::Stale);
        assert_eq!(meta.freshness(200), Freshness::Expired);
    }

    #[test]
    fn test_refresh_never_after_expiry() {
        let meta = CachedResponse::new("/a", 100).with_refresh_at(500);
        assert_eq!(meta.refresh_at, 100);
    }

    #[test]
    fn test_legacy_metadata_defaults() {
        let meta: CachedResponse =
            serde_json::from_str(r#"{"url": "/a", "expires_at": 10}"#).unwrap();
        assert_eq!(meta.etag, None);
        assert_eq!(meta.refresh_at, 0);
        assert_eq!(meta.len, 0);
    }
}
