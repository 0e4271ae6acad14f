//! Widget tree variants and their identity keys.

use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use super::action::{ActionSpec, join_actions};

/// Identity keys claimed by one widget. Most widgets claim one.
pub type IdentityKeys = SmallVec<[String; 2]>;

/// Declarative widget description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum Widget {
    Text {
        text: String,
    },
    Button {
        text: String,
        #[serde(default)]
        actions: Vec<ActionSpec>,
    },
    Textfield {
        var: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        initial: String,
    },
    Checkbox {
        var: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        initial: bool,
    },
    Image {
        url: String,
    },
    Column {
        #[serde(default)]
        widgets: Vec<Widget>,
    },
    Scroll {
        widget: Box<Widget>,
    },
    Empty,
}

/// How a widget is matched against the previous tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No instance; rebuilt every time.
    Stateless,
    /// Matched by explicit identity keys.
    Keyed(IdentityKeys),
    /// Matched by encounter order among scroll containers.
    Positional,
}

impl Widget {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn button(text: impl Into<String>, actions: Vec<ActionSpec>) -> Self {
        Self::Button {
            text: text.into(),
            actions,
        }
    }

    pub fn textfield(var: impl Into<String>) -> Self {
        Self::Textfield {
            var: var.into(),
            label: String::new(),
            initial: String::new(),
        }
    }

    pub fn column(widgets: Vec<Widget>) -> Self {
        Self::Column { widgets }
    }

    pub fn scroll(widget: Widget) -> Self {
        Self::Scroll {
            widget: Box::new(widget),
        }
    }

    pub fn identity(&self) -> Identity {
        match self {
            Self::Button { text, actions } => Identity::Keyed(smallvec![
                format!("button:actions:{}", join_actions(actions)),
                format!("button:text:{text}"),
            ]),
            Self::Textfield { var, .. } => Identity::Keyed(smallvec![format!("textfield:{var}")]),
            Self::Checkbox { var, .. } => Identity::Keyed(smallvec![format!("checkbox:{var}")]),
            Self::Image { url } => Identity::Keyed(smallvec![format!("image:{url}")]),
            Self::Scroll { .. } => Identity::Positional,
            Self::Text { .. } | Self::Column { .. } | Self::Empty => Identity::Stateless,
        }
    }

    pub fn children(&self) -> &[Widget] {
        match self {
            Self::Column { widgets } => widgets,
            Self::Scroll { widget } => std::slice::from_ref(widget.as_ref()),
            _ => &[],
        }
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Button { .. } => "button",
            Self::Textfield { .. } => "textfield",
            Self::Checkbox { .. } => "checkbox",
            Self::Image { .. } => "image",
            Self::Column { .. } => "column",
            Self::Scroll { .. } => "scroll",
            Self::Empty => "empty",
        }
    }

    /// Visit this widget and every descendant, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Widget)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}
