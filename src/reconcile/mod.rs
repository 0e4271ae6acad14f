//! Reconciliation cache: carries stateful instances across tree versions.
//!
//! # Generations
//!
//! ```text
//!            lookup                     register
//! current ──────────> claim(widget) ──────────────> next
//!    │                                                │
//!    └── released if not carried over <── flip() ─────┘
//!                                          next becomes current
//! ```
//!
//! Keyed widgets (buttons, inputs, images) are matched by identity key.
//! An instance found in `current` is removed from it along with all of its
//! keys, so no two nodes of one pass share an instance. When two different
//! instances register the same key in `next`, the key becomes ambiguous
//! and never satisfies a lookup after the flip.
//!
//! Scroll containers have no key. They are matched by encounter order
//! within a pass, in a list separate from the keyed map.

mod assemble;
mod instance;

pub use assemble::{ViewNode, assemble_page};
pub use instance::{
    ButtonState, CheckboxState, DefaultFactory, ImageState, Instance, InstanceFactory,
    InstanceRef, NoState, ScrollState, TextfieldState,
};

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::spec::{Identity, IdentityKeys, Widget};

/// What one identity key resolves to within a generation.
enum Slot {
    Unique(InstanceRef),
    /// Claimed by more than one instance; never matched.
    Ambiguous,
}

#[derive(Default)]
struct Generation {
    keyed: FxHashMap<String, Slot>,
    scrolls: Vec<InstanceRef>,
    /// Every instance placed in this generation, keyed or not.
    placed: Vec<InstanceRef>,
}

impl Generation {
    fn contains(&self, instance: &InstanceRef) -> bool {
        self.placed.iter().any(|p| Arc::ptr_eq(p, instance))
    }
}

/// Identity key -> instance map with two-generation bookkeeping.
pub struct ReconciliationCache {
    current: Generation,
    next: Generation,
    /// Scroll containers handed out in the pass being assembled.
    scroll_cursor: usize,
    flips: u64,
    factory: Arc<dyn InstanceFactory>,
}

impl ReconciliationCache {
    pub fn new(factory: Arc<dyn InstanceFactory>) -> Self {
        Self {
            current: Generation::default(),
            next: Generation::default(),
            scroll_cursor: 0,
            flips: 0,
            factory,
        }
    }

    /// Number of completed passes.
    pub fn flips(&self) -> u64 {
        self.flips
    }

    /// Instances on screen (placed in the last completed pass).
    pub fn len(&self) -> usize {
        self.current.placed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.placed.is_empty()
    }

    /// Whether `key` was claimed by more than one instance last pass.
    pub fn is_ambiguous(&self, key: &str) -> bool {
        matches!(self.current.keyed.get(key), Some(Slot::Ambiguous))
    }

    /// Instance for `widget` in the pass being assembled.
    ///
    /// Returns `None` for stateless widgets. Reused instances are updated
    /// in place; new ones come from the factory.
    pub fn claim(&mut self, widget: &Widget) -> Option<InstanceRef> {
        match widget.identity() {
            Identity::Stateless => None,
            Identity::Keyed(keys) => Some(self.claim_keyed(widget, keys)),
            Identity::Positional => Some(self.claim_positional(widget)),
        }
    }

    fn claim_keyed(&mut self, widget: &Widget, keys: IdentityKeys) -> InstanceRef {
        let reused = keys.iter().find_map(|key| match self.current.keyed.get(key) {
            Some(Slot::Unique(instance)) => Some(instance.clone()),
            _ => None,
        });

        let instance = match reused {
            Some(instance) => {
                // Take every key of the instance out of play for this pass.
                self.current
                    .keyed
                    .retain(|_, slot| !matches!(slot, Slot::Unique(i) if Arc::ptr_eq(i, &instance)));
                instance.lock().update(widget);
                instance
            }
            None => instance::wrap(self.factory.create(widget)),
        };

        for key in keys {
            match self.next.keyed.get(&key) {
                None => {
                    self.next.keyed.insert(key, Slot::Unique(instance.clone()));
                }
                Some(Slot::Unique(other)) if !Arc::ptr_eq(other, &instance) => {
                    crate::debug!("reconcile"; "ambiguous identity key {}", key);
                    self.next.keyed.insert(key, Slot::Ambiguous);
                }
                Some(_) => {}
            }
        }
        self.place(instance)
    }

    fn claim_positional(&mut self, widget: &Widget) -> InstanceRef {
        let instance = match self.current.scrolls.get(self.scroll_cursor) {
            Some(instance) => {
                let instance = instance.clone();
                instance.lock().update(widget);
                instance
            }
            None => instance::wrap(self.factory.create(widget)),
        };
        self.scroll_cursor += 1;
        self.next.scrolls.push(instance.clone());
        self.place(instance)
    }

    fn place(&mut self, instance: InstanceRef) -> InstanceRef {
        if !self.next.contains(&instance) {
            self.next.placed.push(instance.clone());
        }
        instance
    }

    /// Finish the pass: `next` becomes `current`, and every instance that
    /// was not carried over is released. Returns how many were released.
    pub fn flip(&mut self) -> usize {
        let next = std::mem::take(&mut self.next);
        let previous = std::mem::replace(&mut self.current, next);
        self.scroll_cursor = 0;
        self.flips += 1;

        let kept: FxHashSet<*const ()> = self
            .current
            .placed
            .iter()
            .map(|i| Arc::as_ptr(i).cast::<()>())
            .collect();
        let mut released = 0;
        for instance in previous.placed {
            if !kept.contains(&Arc::as_ptr(&instance).cast::<()>()) {
                instance.lock().release();
                released += 1;
            }
        }
        if released > 0 {
            crate::debug!("reconcile"; "released {} instance(s)", released);
        }
        released
    }

    /// Release every instance, on screen or being assembled.
    pub fn clear(&mut self) -> usize {
        let current = std::mem::take(&mut self.current);
        let next = std::mem::take(&mut self.next);
        self.scroll_cursor = 0;

        let mut released = 0;
        for instance in current.placed {
            if !next.contains(&instance) {
                instance.lock().release();
                released += 1;
            }
        }
        for instance in next.placed {
            instance.lock().release();
            released += 1;
        }
        released
    }
}

impl Drop for ReconciliationCache {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for ReconciliationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationCache")
            .field("instances", &self.current.placed.len())
            .field("keys", &self.current.keyed.len())
            .field("scrolls", &self.current.scrolls.len())
            .field("flips", &self.flips)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ActionSpec, VarStore};

    fn cache() -> ReconciliationCache {
        ReconciliationCache::new(Arc::new(DefaultFactory::new(VarStore::new())))
    }

    fn pass(cache: &mut ReconciliationCache, widgets: &[Widget]) -> Vec<Option<InstanceRef>> {
        let claimed = widgets.iter().map(|w| cache.claim(w)).collect();
        cache.flip();
        claimed
    }

    fn same(a: &Option<InstanceRef>, b: &Option<InstanceRef>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[test]
    fn test_same_key_reuses_instance_across_content_change() {
        let mut cache = cache();
        let before = pass(&mut cache, &[Widget::Textfield {
            var: "name".into(),
            label: "Name".into(),
            initial: String::new(),
        }]);
        let after = pass(&mut cache, &[Widget::Textfield {
            var: "name".into(),
            label: "Full name".into(),
            initial: String::new(),
        }]);

        assert!(same(&before[0], &after[0]));
        let instance = after[0].as_ref().unwrap().lock();
        assert_eq!(
            instance.downcast_ref::<TextfieldState>().unwrap().label,
            "Full name"
        );
    }

    #[test]
    fn test_button_matches_on_either_key() {
        let mut cache = cache();
        let before = pass(&mut cache, &[Widget::button("Save", vec![ActionSpec::rpc("/save")])]);
        // Text changed, actions unchanged.
        let after = pass(&mut cache, &[Widget::button("Saving", vec![ActionSpec::rpc("/save")])]);
        assert!(same(&before[0], &after[0]));
    }

    #[test]
    fn test_one_instance_per_node_within_a_pass() {
        let mut cache = cache();
        pass(&mut cache, &[Widget::textfield("q")]);

        let claimed = pass(&mut cache, &[Widget::textfield("q"), Widget::textfield("q")]);
        assert!(!same(&claimed[0], &claimed[1]));
        assert!(cache.is_ambiguous("textfield:q"));
    }

    #[test]
    fn test_ambiguous_key_is_never_reused() {
        let mut cache = cache();
        let first = pass(&mut cache, &[Widget::textfield("q"), Widget::textfield("q")]);
        assert!(cache.is_ambiguous("textfield:q"));

        let second = pass(&mut cache, &[Widget::textfield("q")]);
        assert!(!same(&first[0], &second[0]));
        assert!(!same(&first[1], &second[0]));
    }

    #[test]
    fn test_flip_releases_dropped_instances() {
        let mut cache = cache();
        let first = pass(&mut cache, &[
            Widget::Image { url: "/a.png".into() },
            Widget::Image { url: "/b.png".into() },
        ]);
        let cancel_a = {
            let instance = first[0].as_ref().unwrap().lock();
            instance.downcast_ref::<ImageState>().unwrap().cancel.clone()
        };
        let cancel_b = {
            let instance = first[1].as_ref().unwrap().lock();
            instance.downcast_ref::<ImageState>().unwrap().cancel.clone()
        };

        cache.claim(&Widget::Image { url: "/b.png".into() });
        assert_eq!(cache.flip(), 1);
        assert!(cancel_a.is_cancelled());
        assert!(!cancel_b.is_cancelled());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_scrolls_recycled_in_encounter_order() {
        let mut cache = cache();
        let scroll = Widget::scroll(Widget::text("x"));
        let first = pass(&mut cache, &[scroll.clone(), scroll.clone()]);
        let second = pass(&mut cache, &[scroll.clone(), scroll.clone(), scroll.clone()]);

        assert!(same(&first[0], &second[0]));
        assert!(same(&first[1], &second[1]));
        assert!(!same(&first[0], &second[2]));

        let third = pass(&mut cache, &[scroll]);
        assert!(same(&first[0], &third[0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stateless_widgets_have_no_instance() {
        let mut cache = cache();
        let claimed = pass(&mut cache, &[Widget::text("hi"), Widget::Empty]);
        assert!(claimed.iter().all(Option::is_none));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_drop_releases_everything() {
        let mut cache = cache();
        let claimed = pass(&mut cache, &[Widget::Image { url: "/a.png".into() }]);
        let cancel = {
            let instance = claimed[0].as_ref().unwrap().lock();
            instance.downcast_ref::<ImageState>().unwrap().cancel.clone()
        };
        drop(cache);
        assert!(cancel.is_cancelled());
    }
}
