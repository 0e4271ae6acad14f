//! Persisted stack state.
//!
//! ```text
//! state/
//! └── state.json   { "page_keys": ["/", "/inbox"], "vars": { "name": "Ada" } }
//! ```
//!
//! Read once at startup. Rewritten after every stack mutation while a
//! foreground session is open (`start()` .. `stop()`), never while
//! backgrounded. Writes go through a temp file and a rename, so a crash
//! mid-write leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::PageKey;
use crate::spec::Var;

/// Default state directory (relative to the config file)
pub const STATE_DIR: &str = ".tandem/state";

/// State file name
const STATE_FILE: &str = "state.json";

/// Snapshot of the stack and variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Non-ephemeral page keys, bottom first
    #[serde(default)]
    pub page_keys: Vec<PageKey>,
    #[serde(default)]
    pub vars: BTreeMap<String, Var>,
}

/// Persisted state exists but cannot be used. Never fatal.
#[derive(Debug, Error)]
pub enum StateLoadError {
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("corrupt state file {0}: {1}")]
    Decode(PathBuf, #[source] serde_json::Error),
}

/// Sole owner of the state file.
#[derive(Debug)]
pub struct StateFileOwner {
    dir: PathBuf,
    started: AtomicBool,
    /// Serializes writers of the file.
    write_lock: Mutex<()>,
}

impl StateFileOwner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            started: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Previous state, or `None` when missing or unreadable.
    pub fn read(&self) -> Option<PersistedState> {
        match self.try_read() {
            Ok(state) => state,
            Err(e) => {
                crate::log!("state"; "{}, starting fresh", e);
                None
            }
        }
    }

    /// Like [`read`](Self::read), but reports why a present file is unusable.
    pub fn try_read(&self) -> Result<Option<PersistedState>, StateLoadError> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateLoadError::Io(path, e)),
        };
        let state: PersistedState =
            serde_json::from_slice(&bytes).map_err(|e| StateLoadError::Decode(path, e))?;
        crate::debug!("state"; "restored {} page(s), {} var(s)", state.page_keys.len(), state.vars.len());
        Ok(Some(state))
    }

    /// Enable writes (app foregrounded).
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Disable writes (app backgrounded).
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Snapshot `state` if a session is open.
    ///
    /// Returns whether the file was written.
    pub fn write(&self, state: &PersistedState) -> std::io::Result<bool> {
        if !self.is_started() {
            crate::debug!("state"; "not started, skipping write");
            return Ok(false);
        }
        self.write_now(state)
    }

    /// Clear the page sequence, keeping variables. Works while stopped.
    pub fn erase_stack(&self) -> std::io::Result<()> {
        let mut state = self.read().unwrap_or_default();
        state.page_keys.clear();
        self.write_now(&state)?;
        crate::debug!("state"; "erased stack");
        Ok(())
    }

    fn write_now(&self, state: &PersistedState) -> std::io::Result<bool> {
        let _guard = self.write_lock.lock();
        let json = serde_json::to_string_pretty(state)?;
        let path = self.path();
        if file_content_matches(&path, &json) {
            return Ok(false);
        }
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.dir, &path, json.as_bytes())?;
        crate::debug!("state"; "saved {} page(s), {} var(s)", state.page_keys.len(), state.vars.len());
        Ok(true)
    }
}

fn file_content_matches(path: &Path, content: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = dir.join(format!("{STATE_FILE}.tmp"));
    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)
}
