//! Server caller: requests, retries, write-through caching, staleness.
//!
//! # Staleness
//!
//! Every call takes a [`LogicalInstant`] from the shared clock when it is
//! dispatched. Before a page result is applied, [`ServerCaller::try_apply`]
//! compares that stamp with the newest one already applied for the same
//! key and refuses anything older:
//!
//! ```text
//! t1  Poll  GET /inbox ─────────────────────────────┐ (slow)
//! t2  Push  GET /inbox ───────┐                      │
//!                             └─> try_apply(t2) ok   │
//!                                                    └─> try_apply(t1) stale
//! ```
//!
//! # Retries
//!
//! Network and 5xx failures are retried with jittered delays from the
//! [`RetryPolicy`]. Cancellation stops the loop between and during attempts
//! but never undoes an effect already applied.

mod error;
mod headers;
mod http;
mod transport;

#[cfg(test)]
pub mod testing;

pub use error::CallError;
pub use headers::CacheControl;
pub use http::HttpTransport;
pub use transport::{Method, Request, Response, Transport, TransportError};

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use url::Url;

use crate::cache::{CachedResponse, Freshness, ResponseCache};
use crate::core::{Cancellation, LogicalClock, LogicalInstant, PageKey, unix_now};
use crate::retry::RetryPolicy;
use crate::spec::{PageSpec, Var, decode_page};

/// Default `User-Agent` header.
pub const USER_AGENT: &str = concat!("tandem/", env!("CARGO_PKG_VERSION"));

/// A page obtained from the server.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub key: PageKey,
    pub spec: PageSpec,
    /// Dispatch time of the call that produced it.
    pub stamp: LogicalInstant,
    /// True when the server answered `304` and the cached body was reused.
    pub not_modified: bool,
}

#[derive(Serialize)]
struct RpcBody<'a> {
    vars: &'a BTreeMap<String, Var>,
}

/// Issues page fetches and RPCs against one server.
pub struct ServerCaller {
    transport: Arc<dyn Transport>,
    base: Url,
    user_agent: String,
    clock: Arc<LogicalClock>,
    retry: RetryPolicy,
    default_max_age: u64,
    /// Only touched while this lock is held.
    cache: Mutex<ResponseCache>,
    /// Newest applied stamp per page key.
    applied: DashMap<PageKey, LogicalInstant>,
}

impl ServerCaller {
    pub fn new(
        transport: Arc<dyn Transport>,
        base: Url,
        clock: Arc<LogicalClock>,
        retry: RetryPolicy,
        cache: ResponseCache,
    ) -> Self {
        Self {
            transport,
            base,
            user_agent: USER_AGENT.to_string(),
            clock,
            retry,
            default_max_age: 0,
            cache: Mutex::new(cache),
            applied: DashMap::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Lifetime (seconds) of responses that carry no caching headers.
    pub fn with_default_max_age(mut self, seconds: u64) -> Self {
        self.default_max_age = seconds;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// Exclusive access to the response cache.
    pub fn cache(&self) -> MutexGuard<'_, ResponseCache> {
        self.cache.lock()
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    /// Record `stamp` as applied for `key` unless something newer already was.
    ///
    /// Returns false (and records nothing) for a stale result.
    pub fn try_apply(&self, key: &PageKey, stamp: LogicalInstant) -> bool {
        let mut newest = self.applied.entry(key.clone()).or_insert(LogicalInstant::ZERO);
        if *newest > stamp {
            crate::debug!("server"; "discarding stale result for {} ({} < {})", key, stamp, *newest);
            return false;
        }
        *newest = stamp;
        true
    }

    /// Whether a result stamped `stamp` for `key` would be discarded.
    pub fn is_stale(&self, key: &PageKey, stamp: LogicalInstant) -> bool {
        self.applied.get(key).is_some_and(|newest| *newest > stamp)
    }

    /// Make every call for `key` dispatched before now stale.
    ///
    /// Used when a page leaves the stack while its fetch is still running.
    pub fn supersede(&self, key: &PageKey) {
        let stamp = self.clock.now();
        self.applied.insert(key.clone(), stamp);
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Cached page for `key` with its freshness, if usable at all.
    pub fn cached_page(&self, key: &PageKey) -> Option<(PageSpec, Freshness)> {
        let cache = self.cache.lock();
        let freshness = cache.get(key.as_str())?.freshness(unix_now());
        let spec = cache.get_page_spec(key)?;
        Some((spec, freshness))
    }

    fn store(&self, key: &PageKey, response: &Response, stamp: LogicalInstant) {
        if self.is_stale(key, stamp) {
            return;
        }
        let control = CacheControl::parse(response.header("cache-control"));
        let mut cache = self.cache.lock();
        let result = match control.lifetime(unix_now(), self.default_max_age) {
            Some((expires_at, refresh_at)) => {
                let meta = CachedResponse::new(key.as_str(), expires_at)
                    .with_refresh_at(refresh_at)
                    .with_etag(response.header("etag").map(str::to_string));
                cache.add(meta, &response.body)
            }
            None => cache.remove(key.as_str()).map(|_| ()),
        };
        if let Err(e) = result {
            crate::log!("cache"; "{}", e);
        }
    }

    fn extend(&self, key: &PageKey, response: &Response) {
        let control = CacheControl::parse(response.header("cache-control"));
        let Some((expires_at, refresh_at)) = control.lifetime(unix_now(), self.default_max_age)
        else {
            return;
        };
        if let Err(e) = self.cache.lock().refresh(key.as_str(), expires_at, refresh_at) {
            crate::log!("cache"; "{}", e);
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Fetch the page for `key`, retrying per policy.
    ///
    /// The result is written through the cache but not yet applied: callers
    /// pass `stamp` to [`try_apply`](Self::try_apply) before showing it.
    pub async fn fetch_page(
        &self,
        key: &PageKey,
        cancel: &Cancellation,
    ) -> Result<Fetched, CallError> {
        let url = key
            .resolve(&self.base)
            .map_err(|e| CallError::Client(format!("invalid page key {key}: {e}")))?;

        // Only revalidate what a 304 could actually be served from.
        let etag = {
            let cache = self.cache.lock();
            cache
                .get(key.as_str())
                .and_then(|meta| meta.etag.clone())
                .filter(|_| cache.get_body(key.as_str()).is_some())
        };

        let mut request = Request::get(url.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", self.user_agent.as_str());
        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }

        let stamp = self.clock.now();
        crate::debug!("server"; "GET {} ({})", url, stamp);
        let response = self.call(request, &self.retry, cancel).await?;

        if response.status == 304 {
            let spec = self.cache.lock().get_page_spec(key).ok_or_else(|| {
                CallError::Client(format!("{url}: 304 without a cached page"))
            })?;
            self.extend(key, &response);
            return Ok(Fetched {
                key: key.clone(),
                spec,
                stamp,
                not_modified: true,
            });
        }

        let spec = decode_page(&response.body).map_err(|e| {
            crate::log!("error"; "undecodable page from {}: {}", url, e);
            CallError::Client(format!("{url}: {e}"))
        })?;
        self.store(key, &response, stamp);

        Ok(Fetched {
            key: key.clone(),
            spec,
            stamp,
            not_modified: false,
        })
    }

    /// POST `vars` to `endpoint`. Never retried.
    ///
    /// Returns the page in the response body, if any, with the call's stamp.
    pub async fn rpc(
        &self,
        endpoint: &str,
        vars: &BTreeMap<String, Var>,
        cancel: &Cancellation,
    ) -> Result<Option<(PageSpec, LogicalInstant)>, CallError> {
        let url = self
            .base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| CallError::Client(format!("invalid rpc url {endpoint}: {e}")))?;
        let body = serde_json::to_vec(&RpcBody { vars })
            .map_err(|e| CallError::Client(format!("failed to encode vars: {e}")))?;

        let request = Request::post(url.as_str(), body)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("User-Agent", self.user_agent.as_str());

        let stamp = self.clock.now();
        crate::debug!("server"; "POST {} ({})", url, stamp);
        let response = self.call(request, &RetryPolicy::once(), cancel).await?;

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let spec = decode_page(&response.body).map_err(|e| {
            crate::log!("error"; "undecodable rpc reply from {}: {}", url, e);
            CallError::Client(format!("{url}: {e}"))
        })?;
        Ok(Some((spec, stamp)))
    }

    /// Send `request` until it succeeds, fails permanently, runs out of
    /// attempts or is cancelled.
    async fn call(
        &self,
        request: Request,
        policy: &RetryPolicy,
        cancel: &Cancellation,
    ) -> Result<Response, CallError> {
        let mut attempts = 0;
        loop {
            let Some(sent) = cancel.run(self.transport.send(request.clone())).await else {
                return Err(CallError::Cancelled);
            };
            attempts += 1;

            let error = match sent {
                Ok(response) if response.is_success() || response.status == 304 => {
                    return Ok(response);
                }
                Ok(response) => CallError::from_status(&response),
                Err(e) => CallError::from(e),
            };

            if !error.is_retryable() || !policy.allows(attempts) {
                crate::debug!("server"; "{} {} failed after {} attempt(s): {}",
                    request.method.as_str(), request.url, attempts, error);
                return Err(error);
            }

            let delay = policy.delay(attempts - 1);
            crate::debug!("server"; "{} {} failed ({}), retrying in {:?}",
                request.method.as_str(), request.url, error, delay);
            if cancel.run(tokio::time::sleep(delay)).await.is_none() {
                return Err(CallError::Cancelled);
            }
        }
    }
}
