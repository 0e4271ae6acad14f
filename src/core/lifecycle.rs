//! App lifecycle state.
//!
//! Two orthogonal states per running client:
//! - `FOREGROUND`: the app is visible; persistence writes and polling run
//! - `TERMINATED`: termination was noticed; nothing new may start
//!
//! Plus the process-wide Ctrl+C signal used by the headless driver.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Cancellation;

/// Lifecycle flags of one client instance.
#[derive(Debug, Default)]
pub struct Lifecycle {
    foreground: AtomicBool,
    terminated: AtomicBool,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            foreground: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // FOREGROUND state
    // =========================================================================

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst) && !self.is_terminated()
    }

    /// Returns true if the state changed.
    pub fn set_foreground(&self, foreground: bool) -> bool {
        self.foreground.swap(foreground, Ordering::SeqCst) != foreground
    }

    // =========================================================================
    // TERMINATED state
    // =========================================================================

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Returns true on the first call only.
    pub fn terminate(&self) -> bool {
        self.foreground.store(false, Ordering::SeqCst);
        !self.terminated.swap(true, Ordering::SeqCst)
    }
}

// =============================================================================
// Process shutdown signal
// =============================================================================

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

static SHUTDOWN_SIGNAL: OnceLock<Cancellation> = OnceLock::new();

/// Install the Ctrl+C handler. Call once at program start.
///
/// Returns a token that is cancelled when the signal arrives.
pub fn setup_shutdown_handler() -> anyhow::Result<Cancellation> {
    let signal = SHUTDOWN_SIGNAL.get_or_init(Cancellation::new).clone();
    let handler_signal = signal.clone();
    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::SeqCst);
        handler_signal.cancel();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;
    Ok(signal)
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreground_transitions() {
        let life = Lifecycle::new();
        assert!(!life.is_foreground());
        assert!(life.set_foreground(true));
        assert!(!life.set_foreground(true));
        assert!(life.is_foreground());
        assert!(life.set_foreground(false));
        assert!(!life.is_foreground());
    }

    #[test]
    fn test_terminate_disables_foreground() {
        let life = Lifecycle::new();
        life.set_foreground(true);
        assert!(life.terminate());
        assert!(!life.terminate());
        assert!(life.is_terminated());
        life.set_foreground(true);
        assert!(!life.is_foreground());
    }
}
