//! Stack entries and the view handed to renderers.

use std::sync::Arc;

use crate::core::PageKey;
use crate::reconcile::{InstanceFactory, ReconciliationCache, ViewNode, assemble_page};
use crate::spec::PageSpec;

/// One page on the stack.
///
/// Owns the reconciliation cache of its widget tree; dropping the entry
/// releases every instance it holds.
#[derive(Debug)]
pub struct StackEntry {
    pub key: PageKey,
    spec: PageSpec,
    /// Bumped on every spec change; renderers use it to skip equal pages.
    generation: u64,
    widgets: ReconciliationCache,
    views: Vec<ViewNode>,
    /// Generation the views were assembled from.
    assembled: Option<u64>,
}

impl StackEntry {
    pub fn new(
        key: PageKey,
        spec: PageSpec,
        generation: u64,
        factory: Arc<dyn InstanceFactory>,
    ) -> Self {
        Self {
            key,
            spec,
            generation,
            widgets: ReconciliationCache::new(factory),
            views: Vec::new(),
            assembled: None,
        }
    }

    pub fn spec(&self) -> &PageSpec {
        &self.spec
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_ephemeral(&self) -> bool {
        self.spec.is_ephemeral()
    }

    /// Replace the spec. Returns false (and keeps the generation) when the
    /// new spec equals the old one.
    pub(super) fn set_spec(&mut self, spec: PageSpec, generation: u64) -> bool {
        if self.spec == spec {
            return false;
        }
        self.spec = spec;
        self.generation = generation;
        true
    }

    /// Reconcile the widget tree if the spec changed since the last pass.
    pub(super) fn assemble(&mut self) {
        if self.assembled == Some(self.generation) {
            return;
        }
        self.views = assemble_page(&self.spec, &mut self.widgets);
        self.assembled = Some(self.generation);
    }

    pub(super) fn view(&self) -> PageView {
        PageView {
            key: self.key.clone(),
            spec: self.spec.clone(),
            generation: self.generation,
            views: self.views.clone(),
        }
    }
}

/// What a renderer receives for one stack entry.
#[derive(Debug, Clone)]
pub struct PageView {
    pub key: PageKey,
    pub spec: PageSpec,
    pub generation: u64,
    /// Assembled widget tree, chrome first.
    pub views: Vec<ViewNode>,
}

/// Consumer of stack updates.
pub trait Renderer: Send + Sync {
    /// Called once per mutation with the whole stack, bottom first.
    fn update(&self, pages: &[PageView]);

    /// Open a URL outside the app.
    fn launch_url(&self, url: &str) {
        crate::log!("stack"; "no handler for external url {}", url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::DefaultFactory;
    use crate::spec::Widget;

    fn entry(spec: PageSpec) -> StackEntry {
        StackEntry::new(PageKey::new("/a"), spec, 1, Arc::new(DefaultFactory::default()))
    }

    #[test]
    fn test_equal_spec_keeps_generation() {
        let mut entry = entry(PageSpec::nav("A", Widget::text("x")));
        assert!(!entry.set_spec(PageSpec::nav("A", Widget::text("x")), 2));
        assert_eq!(entry.generation(), 1);
        assert!(entry.set_spec(PageSpec::nav("A", Widget::text("y")), 3));
        assert_eq!(entry.generation(), 3);
    }

    #[test]
    fn test_assemble_once_per_generation() {
        let mut entry = entry(PageSpec::nav("A", Widget::textfield("q")));
        entry.assemble();
        entry.assemble();
        assert_eq!(entry.widgets.flips(), 1);

        entry.set_spec(PageSpec::nav("B", Widget::textfield("q")), 2);
        entry.assemble();
        assert_eq!(entry.widgets.flips(), 2);
        assert_eq!(entry.view().views.len(), 1);
    }
}
