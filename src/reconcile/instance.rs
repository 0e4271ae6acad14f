//! Stateful widget instances.
//!
//! An instance holds what must survive a tree update: typed text, a scroll
//! offset, an image fetch in flight. The reconciliation cache decides which
//! widget gets which instance; the instance only updates itself from the
//! widget's new description.

use std::any::Any;
use std::sync::Arc;

use crate::core::Cancellation;
use crate::spec::{ActionSpec, Var, VarStore, Widget};
use crate::sync::Deferred;

/// Shared handle to an instance. Identity is `Arc::ptr_eq`.
pub type InstanceRef = Arc<parking_lot::Mutex<Box<dyn Instance>>>;

pub trait Instance: Any + Send {
    /// Apply a new description of the same widget.
    fn update(&mut self, widget: &Widget);

    /// Dropped by a flip. Stop any work in flight.
    fn release(&mut self) {}
}

impl dyn Instance {
    pub fn as_any(&self) -> &dyn Any {
        self
    }

    pub fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    pub fn downcast_ref<T: Instance>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Instance>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

/// Builds the instance for a widget that has none yet.
pub trait InstanceFactory: Send + Sync {
    fn create(&self, widget: &Widget) -> Box<dyn Instance>;
}

pub fn wrap(instance: Box<dyn Instance>) -> InstanceRef {
    Arc::new(parking_lot::Mutex::new(instance))
}

// =============================================================================
// Default instances
// =============================================================================

/// Text input. Keeps what the user typed across updates.
#[derive(Debug)]
pub struct TextfieldState {
    pub var: String,
    pub label: String,
    text: String,
    vars: VarStore,
}

impl TextfieldState {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// User edit: stored locally and in the shared variables.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.vars.set(self.var.as_str(), Var::Str(self.text.clone()));
    }
}

impl Instance for TextfieldState {
    fn update(&mut self, widget: &Widget) {
        if let Widget::Textfield { label, .. } = widget {
            self.label.clone_from(label);
        }
    }
}

#[derive(Debug)]
pub struct CheckboxState {
    pub var: String,
    pub text: String,
    checked: bool,
    vars: VarStore,
}

impl CheckboxState {
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
        self.vars.set(self.var.as_str(), Var::Bool(checked));
    }
}

impl Instance for CheckboxState {
    fn update(&mut self, widget: &Widget) {
        if let Widget::Checkbox { text, .. } = widget {
            self.text.clone_from(text);
        }
    }
}

#[derive(Debug, Default)]
pub struct ButtonState {
    pub text: String,
    pub actions: Vec<ActionSpec>,
    /// Set while the button's actions run.
    pub busy: bool,
}

impl Instance for ButtonState {
    fn update(&mut self, widget: &Widget) {
        if let Widget::Button { text, actions } = widget {
            self.text.clone_from(text);
            self.actions.clone_from(actions);
        }
    }
}

/// Image with a fetch that may still be running.
///
/// Whoever loads the bytes completes `body`; release cancels the load.
#[derive(Debug)]
pub struct ImageState {
    pub url: String,
    pub cancel: Cancellation,
    pub body: Arc<Deferred<Result<Vec<u8>, String>>>,
}

impl ImageState {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cancel: Cancellation::new(),
            body: Arc::new(Deferred::new()),
        }
    }
}

impl Instance for ImageState {
    // Keyed by URL, so there is nothing to update.
    fn update(&mut self, _widget: &Widget) {}

    fn release(&mut self) {
        self.cancel.cancel();
        self.body.try_complete(Err("released".to_string()));
    }
}

#[derive(Debug, Default)]
pub struct ScrollState {
    pub offset: f64,
}

impl Instance for ScrollState {
    fn update(&mut self, _widget: &Widget) {}
}

/// Stateless placeholder, for widgets that never ask for an instance.
#[derive(Debug, Default)]
pub struct NoState;

impl Instance for NoState {
    fn update(&mut self, _widget: &Widget) {}
}

/// Factory for the instances above. Inputs are seeded from the shared
/// variables, falling back to the widget's initial value.
#[derive(Debug, Clone, Default)]
pub struct DefaultFactory {
    vars: VarStore,
}

impl DefaultFactory {
    pub fn new(vars: VarStore) -> Self {
        Self { vars }
    }
}

impl InstanceFactory for DefaultFactory {
    fn create(&self, widget: &Widget) -> Box<dyn Instance> {
        match widget {
            Widget::Textfield {
                var,
                label,
                initial,
            } => {
                let text = match self.vars.get(var) {
                    Some(Var::Str(text)) => text,
                    _ => initial.clone(),
                };
                Box::new(TextfieldState {
                    var: var.clone(),
                    label: label.clone(),
                    text,
                    vars: self.vars.clone(),
                })
            }
            Widget::Checkbox { var, text, initial } => {
                let checked = self
                    .vars
                    .get(var)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(*initial);
                Box::new(CheckboxState {
                    var: var.clone(),
                    text: text.clone(),
                    checked,
                    vars: self.vars.clone(),
                })
            }
            Widget::Button { text, actions } => Box::new(ButtonState {
                text: text.clone(),
                actions: actions.clone(),
                busy: false,
            }),
            Widget::Image { url } => Box::new(ImageState::new(url.as_str())),
            Widget::Scroll { .. } => Box::new(ScrollState::default()),
            Widget::Text { .. } | Widget::Column { .. } | Widget::Empty => Box::new(NoState),
        }
    }
}
