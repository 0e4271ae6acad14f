//! Scripted in-memory transport for tests.
//!
//! Replies are queued per URL path. The last queued reply repeats, so a
//! single `respond` covers every later request. A gated reply holds the
//! request "in flight" until the test opens the gate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::transport::{Request, Response, Transport, TransportError};
use crate::spec::PageSpec;
use crate::sync::Deferred;

/// Latch a gated reply waits on.
pub type Gate = Arc<Deferred<()>>;

pub fn gate() -> Gate {
    Arc::new(Deferred::new())
}

#[derive(Debug, Clone)]
pub enum Reply {
    Respond(Response),
    Fail(TransportError),
    Gated(Gate, Box<Reply>),
}

impl Reply {
    pub fn page(spec: &PageSpec) -> Self {
        Self::Respond(page_response(spec))
    }

    pub fn status(status: u16) -> Self {
        Self::Respond(Response::new(status, Vec::new()))
    }

    pub fn gated(self, gate: &Gate) -> Self {
        Self::Gated(gate.clone(), Box::new(self))
    }
}

/// `200` with `spec` as the JSON body.
pub fn page_response(spec: &PageSpec) -> Response {
    Response::new(200, serde_json::to_vec(spec).unwrap_or_default())
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<FxHashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Request>>,
    sent: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `reply` for requests whose path is `path`.
    pub fn respond(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Number of requests received for `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| path_of(&r.url) == path)
            .count()
    }

    pub fn total(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    fn next_reply(&self, path: &str) -> Option<Reply> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Path and query of an absolute URL.
fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let path = path_of(&request.url);
        // Claim the reply before the request shows up in the counters.
        let mut reply = self.next_reply(&path).unwrap_or(Reply::status(404));
        self.requests.lock().push(request);
        self.sent.fetch_add(1, Ordering::SeqCst);

        loop {
            match reply {
                Reply::Respond(response) => return Ok(response),
                Reply::Fail(error) => return Err(error),
                Reply::Gated(gate, inner) => {
                    gate.value().await;
                    reply = *inner;
                }
            }
        }
    }
}
