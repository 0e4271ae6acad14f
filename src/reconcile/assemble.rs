//! Tree assembly: widget tree + cache -> view tree.

use crate::spec::{PageSpec, Widget};

use super::{InstanceRef, ReconciliationCache};

/// One node of an assembled page, ready for a renderer to paint.
#[derive(Clone)]
pub struct ViewNode {
    pub kind: &'static str,
    /// Visible text (label, caption or URL), if the widget has one.
    pub text: Option<String>,
    pub instance: Option<InstanceRef>,
    pub children: Vec<ViewNode>,
}

impl ViewNode {
    /// Depth-first iterator over this node and its descendants.
    pub fn walk(&self, visit: &mut impl FnMut(&ViewNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

impl std::fmt::Debug for ViewNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewNode")
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("stateful", &self.instance.is_some())
            .field("children", &self.children)
            .finish()
    }
}

fn visible_text(widget: &Widget) -> Option<String> {
    match widget {
        Widget::Text { text } | Widget::Button { text, .. } => Some(text.clone()),
        Widget::Checkbox { text, .. } => Some(text.clone()),
        Widget::Textfield { label, .. } => Some(label.clone()),
        Widget::Image { url } => Some(url.clone()),
        Widget::Column { .. } | Widget::Scroll { .. } | Widget::Empty => None,
    }
}

fn assemble(widget: &Widget, cache: &mut ReconciliationCache) -> ViewNode {
    let instance = cache.claim(widget);
    ViewNode {
        kind: widget.kind(),
        text: visible_text(widget),
        instance,
        children: widget
            .children()
            .iter()
            .map(|child| assemble(child, cache))
            .collect(),
    }
}

/// Assemble every top-level widget of `spec` (chrome first), then flip.
///
/// Assembling an equal spec twice yields the same instances.
pub fn assemble_page(spec: &PageSpec, cache: &mut ReconciliationCache) -> Vec<ViewNode> {
    let views = spec
        .widgets()
        .into_iter()
        .map(|widget| assemble(widget, cache))
        .collect();
    cache.flip();
    views
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reconcile::{DefaultFactory, TextfieldState};
    use crate::spec::{ActionSpec, NavPage, VarStore};

    fn page(fields: &[&str], footer: &str) -> PageSpec {
        let mut widgets: Vec<Widget> = fields.iter().map(|v| Widget::textfield(*v)).collect();
        widgets.push(Widget::text(footer));
        PageSpec::NavPage(NavPage {
            title: "Form".into(),
            start: Some(Widget::button("Back", vec![ActionSpec::Pop])),
            end: None,
            widget: Widget::scroll(Widget::column(widgets)),
            connection: Default::default(),
            ephemeral: false,
        })
    }

    fn instances(views: &[ViewNode]) -> Vec<InstanceRef> {
        let mut found = Vec::new();
        for view in views {
            view.walk(&mut |node| found.extend(node.instance.clone()));
        }
        found
    }

    #[test]
    fn test_update_preserves_instances_and_user_state() {
        let mut cache = ReconciliationCache::new(Arc::new(DefaultFactory::new(VarStore::new())));

        let first = assemble_page(&page(&["name", "email"], "v1"), &mut cache);
        let first = instances(&first);
        // back button, scroll, two text fields
        assert_eq!(first.len(), 4);
        first[2]
            .lock()
            .downcast_mut::<TextfieldState>()
            .unwrap()
            .set_text("Ada");

        let second = instances(&assemble_page(&page(&["name", "email"], "v2"), &mut cache));
        assert_eq!(second.len(), 4);
        for (a, b) in first.iter().zip(&second) {
            assert!(Arc::ptr_eq(a, b));
        }
        assert_eq!(
            second[2].lock().downcast_ref::<TextfieldState>().unwrap().text(),
            "Ada"
        );
    }

    #[test]
    fn test_idempotent_for_equal_specs() {
        let mut cache = ReconciliationCache::new(Arc::new(DefaultFactory::default()));
        let spec = page(&["q"], "footer");
        let first = instances(&assemble_page(&spec, &mut cache));
        let second = instances(&assemble_page(&spec, &mut cache));
        assert_eq!(first.len(), second.len());
        assert!(first.iter().zip(&second).all(|(a, b)| Arc::ptr_eq(a, b)));
        assert_eq!(cache.flips(), 2);
    }

    #[test]
    fn test_loading_page_releases_everything() {
        let mut cache = ReconciliationCache::new(Arc::new(DefaultFactory::default()));
        assemble_page(&page(&["q"], "footer"), &mut cache);
        assert!(!cache.is_empty());

        let views = assemble_page(&PageSpec::Loading, &mut cache);
        assert!(views.is_empty());
        assert!(cache.is_empty());
    }
}
