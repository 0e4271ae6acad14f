//! Stack fixtures shared by stack and app tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use url::Url;

use super::{PageStack, PageView, Renderer};
use crate::cache::ResponseCache;
use crate::core::LogicalClock;
use crate::retry::RetryPolicy;
use crate::server::ServerCaller;
use crate::server::testing::ScriptedTransport;
use crate::spec::{PageSpec, VarStore, Widget};

/// Renderer that remembers every update.
#[derive(Default)]
pub struct RecordingRenderer {
    updates: Mutex<Vec<Vec<PageView>>>,
    launched: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn updates(&self) -> Vec<Vec<PageView>> {
        self.updates.lock().clone()
    }

    pub fn last(&self) -> Vec<PageView> {
        self.updates.lock().last().cloned().unwrap_or_default()
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn update(&self, pages: &[PageView]) {
        self.updates.lock().push(pages.to_vec());
    }

    fn launch_url(&self, url: &str) {
        self.launched.lock().push(url.to_string());
    }
}

pub fn server(transport: Arc<ScriptedTransport>, dir: &TempDir) -> Arc<ServerCaller> {
    let cache = ResponseCache::open(dir.path().join("cache")).unwrap();
    Arc::new(ServerCaller::new(
        transport,
        Url::parse("http://example.test/").unwrap(),
        Arc::new(LogicalClock::new()),
        RetryPolicy::new(vec![1], Some(2)),
        cache,
    ))
}

pub fn fixture(
    dir: &TempDir,
) -> (Arc<ScriptedTransport>, Arc<PageStack>, Arc<RecordingRenderer>) {
    let transport = ScriptedTransport::new();
    let renderer = Arc::new(RecordingRenderer::default());
    let stack = PageStack::new(
        server(transport.clone(), dir),
        renderer.clone(),
        VarStore::new(),
    );
    (transport, Arc::new(stack), renderer)
}

pub fn page(title: &str) -> PageSpec {
    PageSpec::nav(title, Widget::text(title))
}

pub fn keys(stack: &PageStack) -> Vec<String> {
    stack.keys().iter().map(|k| k.as_str().to_string()).collect()
}
