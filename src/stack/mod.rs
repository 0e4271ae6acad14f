//! Page stack: the state machine every action flows through.
//!
//! # Batches
//!
//! [`PageStack::do_actions`] is the only mutation entry point. Batches are
//! serialized by a [`Mutex`]; a batch submitted while another runs waits
//! its turn. Network calls inside a batch may fan out (a `Poll` fetches
//! every polling page at once) but results converge through the server
//! caller's staleness check before touching the stack.
//!
//! ```text
//! do_actions([..]) ──> batch lock ──> apply verb ──> commit
//!                                              │           │
//!                                        ServerCaller   assemble + render
//!                                                       + snapshot
//! ```
//!
//! # Superseded pushes
//!
//! A push holds the batch lock while its page loads. Submitting another
//! navigation batch cancels that load: the pushed `Loading` entry is
//! removed and the rest of its batch is skipped. When the cancelling batch
//! starts with `Pop`, that pop is the one the removal already performed, so
//! `Push /b` then `Pop` while `/b` loads ends on the page below `/b`.

mod entry;
mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use entry::{PageView, Renderer, StackEntry};
pub use poller::Poller;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::task::JoinSet;

use crate::cache::Freshness;
use crate::core::{Cancellation, PageKey};
use crate::persist::{PersistedState, StateFileOwner};
use crate::reconcile::{DefaultFactory, InstanceFactory};
use crate::server::{CallError, ServerCaller};
use crate::spec::{ActionSpec, PageSpec, Var, VarStore, Widget};
use crate::sync::Mutex;

/// Result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Actions that ran (a stopped batch skips the rest).
    pub applied: usize,
    /// Whether the stack changed.
    pub changed: bool,
    /// A newer navigation cancelled this batch's page load.
    pub superseded: bool,
    /// Last error substituted with an error page.
    pub error: Option<CallError>,
}

enum Step {
    Continue,
    Stop,
}

/// Page load of the batch in progress.
struct PendingPush {
    cancel: Cancellation,
    /// Cancelling removes the pushed entry (a fresh push above the root).
    removes_entry: bool,
}

/// Ordered stack of pages plus the machinery to change it.
pub struct PageStack {
    batch: Mutex,
    entries: parking_lot::Mutex<Vec<StackEntry>>,
    server: Arc<ServerCaller>,
    renderer: Arc<dyn Renderer>,
    factory: Arc<dyn InstanceFactory>,
    vars: VarStore,
    state_file: Option<Arc<StateFileOwner>>,
    /// Cancels the page load of the batch in progress.
    pending_push: parking_lot::Mutex<Option<PendingPush>>,
    generations: AtomicU64,
}

impl PageStack {
    pub fn new(server: Arc<ServerCaller>, renderer: Arc<dyn Renderer>, vars: VarStore) -> Self {
        Self {
            batch: Mutex::new(),
            entries: parking_lot::Mutex::new(Vec::new()),
            server,
            renderer,
            factory: Arc::new(DefaultFactory::new(vars.clone())),
            vars,
            state_file: None,
            pending_push: parking_lot::Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn InstanceFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Snapshot into `owner` after every mutation.
    pub fn with_state_file(mut self, owner: Arc<StateFileOwner>) -> Self {
        self.state_file = Some(owner);
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn vars(&self) -> &VarStore {
        &self.vars
    }

    pub fn server(&self) -> &ServerCaller {
        &self.server
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Page keys, bottom first.
    pub fn keys(&self) -> Vec<PageKey> {
        self.entries.lock().iter().map(|e| e.key.clone()).collect()
    }

    pub fn pages(&self) -> Vec<PageView> {
        self.entries.lock().iter().map(StackEntry::view).collect()
    }

    pub fn top(&self) -> Option<PageView> {
        self.entries.lock().last().map(StackEntry::view)
    }

    pub fn top_spec(&self) -> Option<PageSpec> {
        self.entries.lock().last().map(|e| e.spec().clone())
    }

    /// What would be persisted right now.
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            page_keys: persisted_keys(&self.entries.lock()),
            vars: self.vars.snapshot(),
        }
    }

    /// Set a variable and snapshot if it changed.
    pub fn set_var(&self, name: &str, value: Var) {
        if self.vars.set(name, value) {
            self.save();
        }
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Apply `actions` in order, after any batch already running.
    pub async fn do_actions(&self, actions: &[ActionSpec]) -> Outcome {
        let mut undone_push = false;
        if actions.iter().any(ActionSpec::is_navigation)
            && let Some(pending) = self.pending_push.lock().take()
        {
            crate::debug!("stack"; "superseding page load in progress");
            pending.cancel.cancel();
            undone_push = pending.removes_entry;
        }

        let _batch = self.batch.lock().await;
        let mut outcome = Outcome::default();

        for action in actions {
            crate::debug!("stack"; "{}", action);
            outcome.applied += 1;
            // The cancelled push already took its entry off the stack.
            if action.is_navigation()
                && std::mem::take(&mut undone_push)
                && matches!(action, ActionSpec::Pop)
            {
                outcome.changed = true;
                continue;
            }
            if let Step::Stop = self.apply(action, &mut outcome).await {
                break;
            }
        }
        outcome
    }

    /// Rebuild the stack from persisted keys: cache first, server otherwise.
    pub async fn restore(&self, keys: &[PageKey]) -> Outcome {
        let _batch = self.batch.lock().await;
        let mut outcome = Outcome::default();

        let mut restored = Vec::with_capacity(keys.len());
        for key in keys {
            let spec = match self.server.cached_page(key) {
                Some((spec, _)) => spec,
                None => match self.server.fetch_page(key, &Cancellation::new()).await {
                    Ok(fetched) => {
                        self.server.try_apply(key, fetched.stamp);
                        fetched.spec
                    }
                    Err(e) => {
                        crate::log!("stack"; "failed to restore {}: {}", key, e);
                        outcome.error = Some(e.clone());
                        e.to_page()
                    }
                },
            };
            restored.push(self.new_entry(key.clone(), spec));
        }

        {
            let mut entries = self.entries.lock();
            let removed = std::mem::replace(&mut *entries, restored);
            self.supersede_removed(&entries, removed);
        }
        outcome.applied = keys.len();
        outcome.changed = true;
        self.commit();
        crate::log!("stack"; "restored {} page(s)", keys.len());
        outcome
    }

    /// Re-send the stack to the renderer from a synchronous call site.
    pub fn rerender_blocking(&self) {
        let _batch = self.batch.lock_blocking();
        self.commit();
    }

    /// Run `f` once no batch is running, holding new batches off meanwhile.
    pub fn with_batch_blocking<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.batch.lock_blocking();
        f()
    }

    /// Async form of [`with_batch_blocking`](Self::with_batch_blocking).
    pub async fn with_batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.batch.lock().await;
        f()
    }

    /// Cancel the page load of the running batch, if any.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.pending_push.lock().take() {
            pending.cancel.cancel();
        }
    }

    async fn apply(&self, action: &ActionSpec, outcome: &mut Outcome) -> Step {
        match action {
            ActionSpec::Push { page } => self.push(page, outcome).await,
            ActionSpec::Pop => {
                if self.pop() {
                    outcome.changed = true;
                    self.commit();
                }
                Step::Continue
            }
            ActionSpec::PopTo { page } => {
                if self.pop_to(page) {
                    outcome.changed = true;
                    self.commit();
                }
                Step::Continue
            }
            ActionSpec::ReplaceAll { page } => {
                {
                    let mut entries = self.entries.lock();
                    let removed = std::mem::take(&mut *entries);
                    self.supersede_removed(&entries, removed);
                }
                self.resolve(page, outcome).await
            }
            ActionSpec::Poll => {
                if self.poll().await {
                    outcome.changed = true;
                    self.commit();
                }
                Step::Continue
            }
            ActionSpec::LaunchUrl { url } => {
                self.renderer.launch_url(url);
                Step::Continue
            }
            ActionSpec::Rpc { url } => self.rpc(url, outcome).await,
        }
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    async fn push(&self, key: &PageKey, outcome: &mut Outcome) -> Step {
        {
            let mut entries = self.entries.lock();
            // Already showing: drop ephemeral pages above it, push nothing.
            if let Some(top) = entries.iter().rposition(|e| !e.is_ephemeral())
                && entries[top].key == *key
            {
                if top + 1 < entries.len() {
                    entries.truncate(top + 1);
                    drop(entries);
                    outcome.changed = true;
                    self.commit();
                }
                return Step::Continue;
            }
        }
        self.resolve(key, outcome).await
    }

    /// Append `key` (cached page or `Loading`) and load it from the server.
    async fn resolve(&self, key: &PageKey, outcome: &mut Outcome) -> Step {
        let cached = self.server.cached_page(key);
        let revalidating = matches!(cached, Some((_, Freshness::Stale)));
        let fresh = matches!(cached, Some((_, Freshness::Fresh)));

        let spec = cached.map_or(PageSpec::Loading, |(spec, _)| spec);
        let index = {
            let mut entries = self.entries.lock();
            entries.push(self.new_entry(key.clone(), spec));
            entries.len() - 1
        };
        outcome.changed = true;
        self.commit();
        if fresh {
            crate::debug!("stack"; "{} served from cache", key);
            return Step::Continue;
        }

        let cancel = Cancellation::new();
        *self.pending_push.lock() = Some(PendingPush {
            cancel: cancel.clone(),
            removes_entry: !revalidating && index > 0,
        });
        let result = self.server.fetch_page(key, &cancel).await;
        self.pending_push.lock().take();

        let result = match result {
            Ok(_) if cancel.is_cancelled() => Err(CallError::Cancelled),
            Ok(fetched) if !self.server.try_apply(key, fetched.stamp) => Err(CallError::Cancelled),
            other => other,
        };

        match result {
            Ok(fetched) => {
                if self.set_spec_at(index, fetched.spec) {
                    self.commit();
                }
                Step::Continue
            }
            Err(CallError::Cancelled) => {
                outcome.superseded = true;
                if !revalidating {
                    self.withdraw(index, key);
                }
                Step::Stop
            }
            Err(e) if revalidating => {
                crate::debug!("stack"; "revalidation of {} failed: {}", key, e);
                Step::Continue
            }
            Err(e) => {
                crate::log!("stack"; "failed to load {}: {}", key, e);
                if self.set_spec_at(index, e.to_page()) {
                    self.commit();
                }
                outcome.error = Some(e);
                Step::Continue
            }
        }
    }

    fn pop(&self) -> bool {
        let mut entries = self.entries.lock();
        if entries.len() <= 1 {
            crate::debug!("stack"; "pop on the root page ignored");
            return false;
        }
        let last = entries.len() - 1;
        let removed = entries.split_off(last);
        self.supersede_removed(&entries, removed);
        true
    }

    /// Pop down to (not including) `key`, or to the root if `key` is absent.
    fn pop_to(&self, key: &PageKey) -> bool {
        let mut entries = self.entries.lock();
        let keep = match entries.iter().rposition(|e| e.key == *key) {
            Some(index) => index + 1,
            None => {
                crate::debug!("stack"; "{} not on the stack, popping to root", key);
                1
            }
        };
        if entries.len() <= keep {
            return false;
        }
        let removed = entries.split_off(keep);
        self.supersede_removed(&entries, removed);
        true
    }

    /// Re-fetch every polling page concurrently. Failures keep the old page.
    async fn poll(&self) -> bool {
        let targets: FxHashSet<PageKey> = self
            .entries
            .lock()
            .iter()
            .filter(|e| !e.is_ephemeral() && e.spec().connection().refreshes())
            .map(|e| e.key.clone())
            .collect();
        if targets.is_empty() {
            return false;
        }
        crate::debug!("poll"; "refreshing {} page(s)", targets.len());

        let mut tasks = JoinSet::new();
        for key in targets {
            let server = self.server.clone();
            tasks.spawn(async move {
                let result = server.fetch_page(&key, &Cancellation::new()).await;
                (key, result)
            });
        }

        let mut changed = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(fetched))) => {
                    if self.server.try_apply(&key, fetched.stamp) {
                        changed |= self.set_spec_for(&key, &fetched.spec);
                    }
                }
                Ok((key, Err(e))) => crate::log!("poll"; "{} not refreshed: {}", key, e),
                Err(e) => crate::log!("poll"; "poll task failed: {}", e),
            }
        }
        changed
    }

    async fn rpc(&self, url: &str, outcome: &mut Outcome) -> Step {
        let vars = self.vars.snapshot();
        match self.server.rpc(url, &vars, &Cancellation::new()).await {
            Ok(Some((spec, stamp))) => {
                let top = self.entries.lock().last().map(|e| e.key.clone());
                if let Some(key) = top
                    && self.server.try_apply(&key, stamp)
                    && self.set_spec_for_top(spec)
                {
                    outcome.changed = true;
                    self.commit();
                }
                Step::Continue
            }
            Ok(None) => Step::Continue,
            Err(e) => {
                crate::log!("stack"; "rpc {} failed: {}", url, e);
                let page = e.to_page().with_ephemeral(true);
                self.entries
                    .lock()
                    .push(self.new_entry(PageKey::new(url), page));
                outcome.changed = true;
                outcome.error = Some(e);
                self.commit();
                Step::Stop
            }
        }
    }

    // =========================================================================
    // Entry bookkeeping
    // =========================================================================

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn new_entry(&self, key: PageKey, spec: PageSpec) -> StackEntry {
        StackEntry::new(key, spec, self.next_generation(), self.factory.clone())
    }

    fn set_spec_at(&self, index: usize, spec: PageSpec) -> bool {
        let generation = self.next_generation();
        self.entries
            .lock()
            .get_mut(index)
            .is_some_and(|entry| entry.set_spec(spec, generation))
    }

    fn set_spec_for_top(&self, spec: PageSpec) -> bool {
        let generation = self.next_generation();
        self.entries
            .lock()
            .last_mut()
            .is_some_and(|entry| entry.set_spec(spec, generation))
    }

    fn set_spec_for(&self, key: &PageKey, spec: &PageSpec) -> bool {
        let mut changed = false;
        for entry in self.entries.lock().iter_mut() {
            if entry.key == *key && !entry.is_ephemeral() {
                changed |= entry.set_spec(spec.clone(), self.next_generation());
            }
        }
        changed
    }

    /// Take a cancelled load off the stack.
    ///
    /// The root has nothing below it to fall back to, so it becomes a page
    /// offering to retry instead.
    fn withdraw(&self, index: usize, key: &PageKey) {
        if index == 0 {
            self.set_spec_at(0, interrupted_page(key));
            self.commit();
            return;
        }
        {
            let mut entries = self.entries.lock();
            if index >= entries.len() {
                return;
            }
            let removed = entries.split_off(index);
            self.supersede_removed(&entries, removed);
        }
        self.commit();
    }

    /// Make late results for keys that left the stack stale, then drop the
    /// removed entries (releasing their widget instances).
    fn supersede_removed(&self, remaining: &[StackEntry], removed: Vec<StackEntry>) {
        for entry in &removed {
            if !remaining.iter().any(|e| e.key == entry.key) {
                self.server.supersede(&entry.key);
            }
        }
    }

    /// Assemble changed pages, hand the stack to the renderer, snapshot.
    fn commit(&self) {
        let (pages, keys) = {
            let mut entries = self.entries.lock();
            for entry in entries.iter_mut() {
                entry.assemble();
            }
            let pages: Vec<PageView> = entries.iter().map(StackEntry::view).collect();
            (pages, persisted_keys(&entries))
        };
        self.renderer.update(&pages);
        self.write_state(keys);
    }

    /// Snapshot the stack and variables now.
    pub fn save(&self) {
        let keys = persisted_keys(&self.entries.lock());
        self.write_state(keys);
    }

    fn write_state(&self, page_keys: Vec<PageKey>) {
        let Some(owner) = &self.state_file else {
            return;
        };
        let state = PersistedState {
            page_keys,
            vars: self.vars.snapshot(),
        };
        if let Err(e) = owner.write(&state) {
            crate::log!("state"; "failed to save state: {}", e);
        }
    }
}

fn persisted_keys(entries: &[StackEntry]) -> Vec<PageKey> {
    entries
        .iter()
        .filter(|e| !e.is_ephemeral())
        .map(|e| e.key.clone())
        .collect()
}

fn interrupted_page(key: &PageKey) -> PageSpec {
    PageSpec::nav(
        "Interrupted",
        Widget::column(vec![
            Widget::text("Loading was interrupted."),
            Widget::button("Retry", vec![ActionSpec::replace_all(key.clone())]),
        ]),
    )
}

/// Fallback timer for pages that stream: refreshed like polling pages.
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(5);

impl PageStack {
    /// How long the poller should wait before the next `Poll`, if the
    /// visible page refreshes at all.
    pub fn top_poll_interval(&self) -> Option<Duration> {
        let entries = self.entries.lock();
        let top = entries.last()?;
        if top.is_ephemeral() {
            return None;
        }
        match top.spec().connection() {
            crate::spec::ConnectionMode::Stream => Some(STREAM_POLL_INTERVAL),
            mode => mode.poll_interval(),
        }
    }
}
