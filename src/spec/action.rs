//! Action verbs embedded in widget trees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::PageKey;

/// A stack mutation or external effect. Actions are data: the server puts
/// them in buttons, the client runs them through `PageStack::do_actions`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Resolve a page and append it.
    Push { page: PageKey },
    /// Remove the top entry.
    Pop,
    /// Remove entries above `page`.
    PopTo { page: PageKey },
    /// Discard the stack and show `page` alone.
    ReplaceAll { page: PageKey },
    /// Re-fetch every polling page.
    Poll,
    /// Open a URL outside the app.
    LaunchUrl { url: String },
    /// POST the variables to an endpoint.
    Rpc { url: String },
}

impl ActionSpec {
    pub fn push(page: impl Into<PageKey>) -> Self {
        Self::Push { page: page.into() }
    }

    pub fn pop_to(page: impl Into<PageKey>) -> Self {
        Self::PopTo { page: page.into() }
    }

    pub fn replace_all(page: impl Into<PageKey>) -> Self {
        Self::ReplaceAll { page: page.into() }
    }

    pub fn rpc(url: impl Into<String>) -> Self {
        Self::Rpc { url: url.into() }
    }

    /// Whether the action changes which pages are on the stack.
    ///
    /// A navigation batch supersedes a push that is still resolving.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Self::Push { .. } | Self::Pop | Self::PopTo { .. } | Self::ReplaceAll { .. }
        )
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push { page } => write!(f, "push:{page}"),
            Self::Pop => f.write_str("pop"),
            Self::PopTo { page } => write!(f, "pop_to:{page}"),
            Self::ReplaceAll { page } => write!(f, "replace_all:{page}"),
            Self::Poll => f.write_str("poll"),
            Self::LaunchUrl { url } => write!(f, "launch_url:{url}"),
            Self::Rpc { url } => write!(f, "rpc:{url}"),
        }
    }
}

/// Render an action list as a stable comma-separated string.
pub fn join_actions(actions: &[ActionSpec]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_actions() {
        let json = r#"[
            {"typ": "push", "page": "/b"},
            {"typ": "pop"},
            {"typ": "pop_to", "page": "/a"},
            {"typ": "replace_all", "page": "/x"},
            {"typ": "poll"},
            {"typ": "launch_url", "url": "https://example.com"},
            {"typ": "rpc", "url": "/save"}
        ]"#;
        let actions: Vec<ActionSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(actions.len(), 7);
        assert_eq!(actions[0], ActionSpec::push("/b"));
        assert_eq!(actions[2], ActionSpec::pop_to("/a"));
        assert_eq!(actions[6], ActionSpec::rpc("/save"));
    }

    #[test]
    fn test_unknown_typ_is_error() {
        let result: Result<ActionSpec, _> = serde_json::from_str(r#"{"typ": "teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_join_actions() {
        let actions = [ActionSpec::rpc("/save"), ActionSpec::Pop];
        assert_eq!(join_actions(&actions), "rpc:/save,pop");
    }

    #[test]
    fn test_is_navigation() {
        assert!(ActionSpec::Pop.is_navigation());
        assert!(ActionSpec::push("/a").is_navigation());
        assert!(!ActionSpec::Poll.is_navigation());
        assert!(!ActionSpec::rpc("/x").is_navigation());
    }
}
