//! Background timer that submits `Poll` batches while foregrounded.
//!
//! The timer follows the visible page: its `poll` interval (or a fixed
//! interval for streaming pages) decides the next wake-up. Pages that do
//! not refresh are rechecked at [`IDLE_RECHECK`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::PageStack;
use crate::core::Cancellation;
use crate::spec::ActionSpec;

/// Wake-up interval while the top page does not poll.
pub const IDLE_RECHECK: Duration = Duration::from_secs(1);

pub struct Poller {
    stack: Arc<PageStack>,
    idle: Duration,
    running: Mutex<Option<Cancellation>>,
}

impl Poller {
    pub fn new(stack: Arc<PageStack>) -> Self {
        Self {
            stack,
            idle: IDLE_RECHECK,
            running: Mutex::new(None),
        }
    }

    pub fn with_idle_recheck(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the timer on the current tokio runtime.
    ///
    /// Returns false if already running or called outside a runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            crate::log!("poll"; "no async runtime, polling disabled");
            return false;
        };

        let cancel = Cancellation::new();
        handle.spawn(run(self.stack.clone(), cancel.clone(), self.idle));
        *running = Some(cancel);
        crate::debug!("poll"; "started");
        true
    }

    /// Stop scheduling polls. A poll batch already running completes.
    pub fn stop(&self) {
        if let Some(cancel) = self.running.lock().take() {
            cancel.cancel();
            crate::debug!("poll"; "stopped");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(stack: Arc<PageStack>, cancel: Cancellation, idle: Duration) {
    loop {
        let interval = stack.top_poll_interval();
        if cancel
            .run(tokio::time::sleep(interval.unwrap_or(idle)))
            .await
            .is_none()
        {
            break;
        }
        // The top page may have changed while sleeping.
        if interval.is_none() || stack.top_poll_interval().is_none() {
            continue;
        }
        let outcome = stack.do_actions(&[ActionSpec::Poll]).await;
        if outcome.changed {
            crate::debug!("poll"; "stack refreshed");
        }
        if cancel.is_cancelled() {
            break;
        }
    }
}
