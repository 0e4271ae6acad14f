//! Running client: wires the engine together and drives its lifecycle.
//!
//! ```text
//! App::new ──> ResponseCache::open (evicts broken/expired entries)
//!          ──> ServerCaller ──> PageStack ──> Poller
//!          ──> StateFileOwner
//!
//! start()      restore persisted stack, or ReplaceAll(initial_page)
//! foreground() persistence on, poller on, Poll
//! background() persistence off, poller off
//! terminate()  everything off, persisted stack erased (vars kept)
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheError, ResponseCache};
use crate::config::{AppConfig, ConfigError};
use crate::core::{LogicalClock, Lifecycle};
use crate::persist::StateFileOwner;
use crate::server::{ServerCaller, Transport};
use crate::spec::{ActionSpec, VarStore};
use crate::stack::{Outcome, PageStack, Poller, Renderer};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open response cache")]
    Cache(#[from] CacheError),
}

pub struct App {
    config: Arc<AppConfig>,
    lifecycle: Lifecycle,
    stack: Arc<PageStack>,
    state_file: Arc<StateFileOwner>,
    poller: Poller,
}

impl App {
    pub fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, AppError> {
        let cache = ResponseCache::open(&config.cache.dir)?;
        let server = ServerCaller::new(
            transport,
            config.base_url()?,
            Arc::new(LogicalClock::new()),
            config.retry.policy(),
            cache,
        )
        .with_user_agent(config.server.user_agent.clone())
        .with_default_max_age(config.cache.default_max_age_secs);

        let state_file = Arc::new(StateFileOwner::new(&config.state.dir));
        let stack = Arc::new(
            PageStack::new(Arc::new(server), renderer, VarStore::new())
                .with_state_file(state_file.clone()),
        );
        let poller = Poller::new(stack.clone());

        Ok(Self {
            config,
            lifecycle: Lifecycle::new(),
            stack,
            state_file,
            poller,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn stack(&self) -> &Arc<PageStack> {
        &self.stack
    }

    pub fn state_file(&self) -> &StateFileOwner {
        &self.state_file
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Restore the previous session (or show the initial page), then
    /// come to the foreground.
    pub async fn start(&self) -> Outcome {
        let state = self.state_file.read().unwrap_or_default();
        self.stack.vars().replace(state.vars);

        let outcome = if state.page_keys.is_empty() {
            let initial = self.config.state.initial_page.clone();
            crate::log!("app"; "starting at {}", initial);
            self.stack.do_actions(&[ActionSpec::ReplaceAll { page: initial }]).await
        } else {
            self.stack.restore(&state.page_keys).await
        };

        self.foreground().await;
        outcome
    }

    pub async fn foreground(&self) {
        if self.lifecycle.is_terminated() || !self.lifecycle.set_foreground(true) {
            return;
        }
        crate::debug!("app"; "foreground");
        self.state_file.start();
        self.stack.save();
        if self.config.poll.enabled {
            self.poller.start();
        }
        self.stack.do_actions(&[ActionSpec::Poll]).await;
    }

    /// Stop persistence and polling. A batch in progress still completes.
    pub fn background(&self) {
        if !self.lifecycle.set_foreground(false) {
            return;
        }
        crate::debug!("app"; "background");
        self.poller.stop();
        self.state_file.stop();
    }

    /// Shut down for good: the next start shows the initial page.
    pub async fn terminate(&self) {
        if !self.shutdown() {
            return;
        }
        let state_file = self.state_file.clone();
        self.stack.with_batch(move || erase(&state_file)).await;
    }

    /// [`terminate`](Self::terminate) for synchronous call sites.
    pub fn terminate_blocking(&self) {
        if !self.shutdown() {
            return;
        }
        let state_file = self.state_file.clone();
        self.stack.with_batch_blocking(move || erase(&state_file));
    }

    fn shutdown(&self) -> bool {
        if !self.lifecycle.terminate() {
            return false;
        }
        crate::log!("app"; "terminating");
        self.poller.stop();
        self.stack.cancel_pending();
        true
    }
}

fn erase(state_file: &StateFileOwner) {
    state_file.stop();
    if let Err(e) = state_file.erase_stack() {
        crate::log!("state"; "failed to erase stack: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PageKey;
    use crate::server::testing::{Reply, ScriptedTransport};
    use crate::spec::Var;
    use crate::stack::testing::{RecordingRenderer, page};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Arc<AppConfig> {
        let mut config = AppConfig::from_str(
            r#"
            [server]
            url = "http://example.test/"

            [retry]
            delays_ms = [1]
            max_attempts = 2

            [state]
            initial_page = "/home"

            [poll]
            enabled = false
            "#,
        )
        .unwrap();
        config.cache.dir = dir.path().join("cache");
        config.state.dir = dir.path().join("state");
        Arc::new(config)
    }

    fn app(dir: &TempDir, transport: &Arc<ScriptedTransport>) -> App {
        App::new(
            config(dir),
            transport.clone(),
            Arc::new(RecordingRenderer::default()),
        )
        .unwrap()
    }

    fn keys(app: &App) -> Vec<String> {
        app.stack().keys().iter().map(|k| k.as_str().to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_start_shows_initial_page_and_persists() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond("/home", Reply::page(&page("Home")));
        let app = app(&dir, &transport);

        app.start().await;
        assert_eq!(keys(&app), ["/home"]);
        assert!(app.lifecycle().is_foreground());
        let saved = app.state_file().read().unwrap();
        assert_eq!(saved.page_keys, [PageKey::new("/home")]);
    }

    #[tokio::test]
    async fn test_restart_restores_stack_and_vars() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        for path in ["/home", "/inbox"] {
            transport.respond(path, Reply::page(&page(path)));
        }
        {
            let app = app(&dir, &transport);
            app.start().await;
            app.stack().do_actions(&[ActionSpec::push("/inbox")]).await;
            app.stack().set_var("name", Var::from("Ada"));
            app.background();
        }

        let app = app(&dir, &transport);
        app.start().await;
        assert_eq!(keys(&app), ["/home", "/inbox"]);
        assert_eq!(app.stack().vars().get("name"), Some(Var::from("Ada")));
    }

    #[tokio::test]
    async fn test_background_stops_persistence() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        for path in ["/home", "/other"] {
            transport.respond(path, Reply::page(&page(path)));
        }
        let app = app(&dir, &transport);
        app.start().await;

        app.background();
        assert!(!app.state_file().is_started());
        app.stack().do_actions(&[ActionSpec::push("/other")]).await;
        assert_eq!(
            app.state_file().read().unwrap().page_keys,
            [PageKey::new("/home")]
        );
    }

    #[tokio::test]
    async fn test_terminate_erases_stack_keeps_vars() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond("/home", Reply::page(&page("Home")));
        let app = app(&dir, &transport);
        app.start().await;
        app.stack().set_var("q", Var::from(true));

        app.terminate().await;
        assert!(app.lifecycle().is_terminated());
        let saved = app.state_file().read().unwrap();
        assert!(saved.page_keys.is_empty());
        assert_eq!(saved.vars.get("q"), Some(&Var::from(true)));

        // A terminated app does not come back.
        app.foreground().await;
        assert!(!app.state_file().is_started());
    }

    #[test]
    fn test_terminate_blocking() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond("/home", Reply::page(&page("Home")));
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let app = runtime.block_on(async {
            let app = app(&dir, &transport);
            app.start().await;
            app
        });

        app.terminate_blocking();
        assert!(app.state_file().read().unwrap().page_keys.is_empty());
    }

    #[test]
    fn test_bad_base_url_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = (*config(&dir)).clone();
        config.server.url = "not a url".into();
        let result = App::new(
            Arc::new(config),
            ScriptedTransport::new(),
            Arc::new(RecordingRenderer::default()),
        );
        assert!(matches!(result, Err(AppError::Config(ConfigError::Validation(_)))));
    }
}
