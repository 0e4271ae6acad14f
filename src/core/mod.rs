//! Core types - small abstractions shared across the engine.

mod cancel;
mod clock;
mod key;
mod lifecycle;

pub use cancel::Cancellation;
pub use clock::{LogicalClock, LogicalInstant};
pub use key::PageKey;
pub use lifecycle::{Lifecycle, is_shutdown, setup_shutdown_handler};

/// Current wall-clock time as UNIX seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
