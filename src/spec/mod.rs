//! Wire types: pages, widgets, actions, variables.
//!
//! Everything here is an immutable value decoded from server JSON.
//! Variants are tagged by a `typ` field; an unknown `typ` fails decoding,
//! which the server caller reports as a client error.
//!
//! ```json
//! {
//!   "typ": "nav_page",
//!   "title": "Inbox",
//!   "widget": { "typ": "column", "widgets": [ ... ] },
//!   "connection": { "mode": "poll", "seconds": 30 }
//! }
//! ```

mod action;
mod var;
mod widget;

pub use action::{ActionSpec, join_actions};
pub use var::{Var, VarStore};
pub use widget::{Identity, IdentityKeys, Widget};

use serde::{Deserialize, Serialize};

/// How a page stays current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConnectionMode {
    #[default]
    Disconnected,
    Poll {
        seconds: u32,
    },
    Stream,
}

impl ConnectionMode {
    /// Whether a `Poll` action re-fetches pages in this mode.
    pub fn refreshes(&self) -> bool {
        matches!(self, Self::Poll { .. } | Self::Stream)
    }

    /// Poll interval, if this mode polls on a timer.
    pub fn poll_interval(&self) -> Option<std::time::Duration> {
        match self {
            Self::Poll { seconds } if *seconds > 0 => {
                Some(std::time::Duration::from_secs(u64::from(*seconds)))
            }
            _ => None,
        }
    }
}

/// Page with navigation chrome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPage {
    pub title: String,
    #[serde(default)]
    pub start: Option<Widget>,
    #[serde(default)]
    pub end: Option<Widget>,
    pub widget: Widget,
    #[serde(default)]
    pub connection: ConnectionMode,
    #[serde(default)]
    pub ephemeral: bool,
}

/// Page without navigation chrome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainPage {
    #[serde(default)]
    pub title: String,
    pub widget: Widget,
    #[serde(default)]
    pub connection: ConnectionMode,
    #[serde(default)]
    pub ephemeral: bool,
}

/// Declarative description of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum PageSpec {
    /// Placeholder shown while a page resolves.
    Loading,
    NavPage(NavPage),
    PlainPage(PlainPage),
}

impl PageSpec {
    /// Navigation page with a title and a body, disconnected, persistent.
    pub fn nav(title: impl Into<String>, widget: Widget) -> Self {
        Self::NavPage(NavPage {
            title: title.into(),
            start: None,
            end: None,
            widget,
            connection: ConnectionMode::Disconnected,
            ephemeral: false,
        })
    }

    pub fn with_connection(mut self, mode: ConnectionMode) -> Self {
        match &mut self {
            Self::NavPage(page) => page.connection = mode,
            Self::PlainPage(page) => page.connection = mode,
            Self::Loading => {}
        }
        self
    }

    pub fn with_ephemeral(mut self, ephemeral: bool) -> Self {
        match &mut self {
            Self::NavPage(page) => page.ephemeral = ephemeral,
            Self::PlainPage(page) => page.ephemeral = ephemeral,
            Self::Loading => {}
        }
        self
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Loading => "",
            Self::NavPage(page) => &page.title,
            Self::PlainPage(page) => &page.title,
        }
    }

    pub fn widget(&self) -> Option<&Widget> {
        match self {
            Self::Loading => None,
            Self::NavPage(page) => Some(&page.widget),
            Self::PlainPage(page) => Some(&page.widget),
        }
    }

    /// Every top-level widget of the page, chrome first.
    pub fn widgets(&self) -> Vec<&Widget> {
        match self {
            Self::Loading => Vec::new(),
            Self::NavPage(page) => page
                .start
                .iter()
                .chain(page.end.iter())
                .chain(std::iter::once(&page.widget))
                .collect(),
            Self::PlainPage(page) => vec![&page.widget],
        }
    }

    pub fn connection(&self) -> ConnectionMode {
        match self {
            Self::Loading => ConnectionMode::Disconnected,
            Self::NavPage(page) => page.connection,
            Self::PlainPage(page) => page.connection,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        match self {
            Self::Loading => false,
            Self::NavPage(page) => page.ephemeral,
            Self::PlainPage(page) => page.ephemeral,
        }
    }
}

/// Decode a page from response bytes.
pub fn decode_page(bytes: &[u8]) -> Result<PageSpec, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nav_page() {
        let json = br#"{
            "typ": "nav_page",
            "title": "Inbox",
            "start": {"typ": "button", "text": "Back", "actions": [{"typ": "pop"}]},
            "widget": {"typ": "text", "text": "3 messages"},
            "connection": {"mode": "poll", "seconds": 30}
        }"#;
        let page = decode_page(json).unwrap();
        assert_eq!(page.title(), "Inbox");
        assert_eq!(
            page.connection(),
            ConnectionMode::Poll { seconds: 30 }
        );
        assert!(!page.is_ephemeral());
        assert_eq!(page.widgets().len(), 2);
    }

    #[test]
    fn test_decode_plain_page_defaults() {
        let json = br#"{"typ": "plain_page", "widget": {"typ": "empty"}, "ephemeral": true}"#;
        let page = decode_page(json).unwrap();
        assert_eq!(page.connection(), ConnectionMode::Disconnected);
        assert!(page.is_ephemeral());
        assert_eq!(page.title(), "");
    }

    #[test]
    fn test_decode_loading_and_unknown() {
        assert_eq!(decode_page(br#"{"typ": "loading"}"#).unwrap(), PageSpec::Loading);
        assert!(decode_page(br#"{"typ": "modal"}"#).is_err());
        assert!(decode_page(b"not json").is_err());
    }

    #[test]
    fn test_structural_equality_drives_change_detection() {
        let a = PageSpec::nav("A", Widget::text("one"));
        let b = PageSpec::nav("A", Widget::text("one"));
        let c = PageSpec::nav("A", Widget::text("two"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_connection_modes() {
        assert!(ConnectionMode::Stream.refreshes());
        assert!(ConnectionMode::Poll { seconds: 5 }.refreshes());
        assert!(!ConnectionMode::Disconnected.refreshes());
        assert_eq!(ConnectionMode::Stream.poll_interval(), None);
        assert_eq!(
            ConnectionMode::Poll { seconds: 5 }.poll_interval(),
            Some(std::time::Duration::from_secs(5))
        );
    }
}
