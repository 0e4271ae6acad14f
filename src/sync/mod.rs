//! Concurrency primitives shared by the stack and the server caller.

mod deferred;
mod mutex;

pub use deferred::Deferred;
pub use mutex::{Mutex, MutexGuard, POLL_INTERVAL};
