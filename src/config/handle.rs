//! Global config handle.
//!
//! Uses `arc-swap` for lock-free reads; the driver installs the loaded
//! config once at startup.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use super::AppConfig;

/// Global config storage.
pub static CONFIG: LazyLock<ArcSwap<AppConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(AppConfig::default()));

#[inline]
pub fn cfg() -> Arc<AppConfig> {
    CONFIG.load_full()
}

#[inline]
pub fn init_config(config: AppConfig) -> Arc<AppConfig> {
    let arc = Arc::new(config);
    CONFIG.store(Arc::clone(&arc));
    arc
}
