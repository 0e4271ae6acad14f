//! Jittered retry delays.
//!
//! A policy is a sequence of target delays. The first retry stays close to
//! its target (±5%); later retries spread over [50%, 150%] of theirs so
//! clients that failed together do not retry together. Once the sequence
//! runs out, its last delay repeats.

use std::time::Duration;

use rand::Rng;

const FIRST_JITTER: (f64, f64) = (0.95, 1.05);
const LATER_JITTER: (f64, f64) = (0.5, 1.5);

/// Retry delay sequence with an optional attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays_ms: Vec<u64>,
    /// Total attempts including the first. `None` retries forever.
    max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![100, 1000, 5000], Some(3))
    }
}

impl RetryPolicy {
    /// Create a policy. An empty delay list behaves like `[0]`.
    pub fn new(delays_ms: Vec<u64>, max_attempts: Option<usize>) -> Self {
        let delays_ms = if delays_ms.is_empty() { vec![0] } else { delays_ms };
        Self {
            delays_ms,
            max_attempts,
        }
    }

    /// Single attempt, never retried.
    pub fn once() -> Self {
        Self::new(vec![0], Some(1))
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Whether another attempt may follow `attempts_made` attempts.
    pub fn allows(&self, attempts_made: usize) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }

    /// Nominal delay before retry number `attempt` (0-based).
    pub fn target(&self, attempt: usize) -> Duration {
        let index = attempt.min(self.delays_ms.len() - 1);
        Duration::from_millis(self.delays_ms[index])
    }

    /// Jittered delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: usize, rng: &mut R) -> Duration {
        let (low, high) = if attempt == 0 {
            FIRST_JITTER
        } else {
            LATER_JITTER
        };
        let factor = rng.gen_range(low..=high);
        let target_micros = self.target(attempt).as_micros() as f64;
        Duration::from_micros((target_micros * factor).round() as u64)
    }
}
