//! Configuration sections.
//!
//! ```toml
//! [server]
//! url = "https://ui.example.com/app/"
//! timeout_ms = 10000
//!
//! [retry]
//! delays_ms = [100, 1000, 5000]
//! max_attempts = 3            # 0 = retry forever
//!
//! [cache]
//! dir = ".tandem/cache"
//! default_max_age_secs = 0    # 0 = cache only what the server marks cacheable
//!
//! [state]
//! dir = ".tandem/state"
//! initial_page = "/"
//!
//! [poll]
//! enabled = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CACHE_DIR;
use crate::core::PageKey;
use crate::persist::STATE_DIR;
use crate::retry::RetryPolicy;
use crate::server::USER_AGENT;

/// `[server]`: where pages come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL page keys resolve against.
    pub url: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/".into(),
            timeout_ms: 10_000,
            user_agent: USER_AGENT.into(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[retry]`: delays between attempts of a failed page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub delays_ms: Vec<u64>,
    /// Total attempts including the first. `0` retries forever.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delays_ms: vec![100, 1000, 5000],
            max_attempts: 3,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let max = (self.max_attempts > 0).then_some(self.max_attempts);
        RetryPolicy::new(self.delays_ms.clone(), max)
    }
}

/// `[cache]`: on-disk response cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Lifetime of responses without caching headers.
    pub default_max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: CACHE_DIR.into(),
            default_max_age_secs: 0,
        }
    }
}

/// `[state]`: persisted stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: PathBuf,
    /// Page shown when nothing was persisted.
    pub initial_page: PageKey,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: STATE_DIR.into(),
            initial_page: PageKey::root(),
        }
    }
}

/// `[poll]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub enabled: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
