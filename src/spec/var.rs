//! Page variables bound to input widgets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Value of a named variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Var {
    Bool(bool),
    Str(String),
}

impl Var {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Var {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Var {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Var {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Shared `name -> Var` map.
///
/// Owned by the page stack; input widget instances hold a clone so user
/// edits land in the same map that is persisted and sent with RPCs.
#[derive(Debug, Clone, Default)]
pub struct VarStore {
    vars: Arc<RwLock<BTreeMap<String, Var>>>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Var> {
        self.vars.read().get(name).cloned()
    }

    /// Set `name`, returning true if the value changed.
    pub fn set(&self, name: impl Into<String>, value: Var) -> bool {
        let mut vars = self.vars.write();
        let name = name.into();
        if vars.get(&name) == Some(&value) {
            return false;
        }
        vars.insert(name, value);
        true
    }

    /// Copy of every variable.
    pub fn snapshot(&self) -> BTreeMap<String, Var> {
        self.vars.read().clone()
    }

    /// Replace every variable (state restore).
    pub fn replace(&self, vars: BTreeMap<String, Var>) {
        *self.vars.write() = vars;
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_serde() {
        let vars: Vec<Var> = serde_json::from_str(r#"[true, "hi"]"#).unwrap();
        assert_eq!(vars, [Var::Bool(true), Var::from("hi")]);
        assert_eq!(serde_json::to_string(&vars).unwrap(), r#"[true,"hi"]"#);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Var::Bool(false).as_bool(), Some(false));
        assert_eq!(Var::Bool(false).as_str(), None);
        assert_eq!(Var::from("x").as_str(), Some("x"));
    }

    #[test]
    fn test_store_is_shared_between_clones() {
        let store = VarStore::new();
        let handle = store.clone();
        assert!(handle.set("name", Var::from("Ada")));
        assert!(!handle.set("name", Var::from("Ada")));
        assert_eq!(store.get("name"), Some(Var::from("Ada")));

        store.replace(BTreeMap::new());
        assert!(handle.is_empty());
    }
}
