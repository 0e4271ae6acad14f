//! Logical clock for ordering causally-related async operations.
//!
//! Every outgoing server request is stamped with `LogicalClock::now()` at
//! dispatch time. Responses are later compared by stamp, so network
//! reordering cannot make an older response look newer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Totally ordered instant issued by a `LogicalClock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalInstant(u64);

impl LogicalInstant {
    /// The instant that precedes every issued instant.
    pub const ZERO: Self = Self(0);

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogicalInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Monotonic counter. Each `now()` is strictly greater than every value
/// returned before it, across all threads.
#[derive(Debug, Default)]
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn now(&self) -> LogicalInstant {
        LogicalInstant(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_now_is_strictly_increasing() {
        let clock = LogicalClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a > LogicalInstant::ZERO);
        assert!(b > a);
    }

    #[test]
    fn test_now_unique_across_threads() {
        let clock = Arc::new(LogicalClock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..1000).map(|_| clock.now()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<LogicalInstant> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
