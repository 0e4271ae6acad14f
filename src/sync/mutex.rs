//! Exclusive lock usable from blocking and async call sites.
//!
//! Both acquire paths map onto the same `locked` flag, so a blocking holder
//! and an async waiter can never both believe they hold the lock.
//!
//! ```text
//! lock_blocking()  ──┐
//!                    ├──> locked: bool  (parking_lot::Mutex + Condvar)
//! lock().await     ──┘      async side polls every POLL_INTERVAL
//! ```
//!
//! The async side polls instead of registering a waker. Blocking waiters
//! are woken through the condvar on release.

use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Condvar;

use crate::core::Cancellation;

/// Interval between acquire attempts of a suspended waiter.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct LockState {
    locked: bool,
    /// Thread that took the lock through `lock_blocking` (re-entry check).
    blocking_holder: Option<ThreadId>,
}

/// Non-reentrant exclusive lock. See module docs.
#[derive(Debug, Default)]
pub struct Mutex {
    state: parking_lot::Mutex<LockState>,
    released: Condvar,
}

impl Mutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lock that is already held by nobody in particular.
    ///
    /// Used by `Deferred`, which releases it on completion.
    pub fn new_locked() -> Self {
        Self {
            state: parking_lot::Mutex::new(LockState {
                locked: true,
                blocking_holder: None,
            }),
            released: Condvar::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Take the lock if it is free.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.locked {
            return false;
        }
        state.locked = true;
        true
    }

    /// Block the current thread until the lock is taken.
    ///
    /// # Panics
    /// If the current thread already holds the lock through this method.
    pub fn acquire_blocking(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        assert!(
            !(state.locked && state.blocking_holder == Some(me)),
            "mutex acquired twice by the same thread"
        );
        while state.locked {
            self.released.wait(&mut state);
        }
        state.locked = true;
        state.blocking_holder = Some(me);
    }

    /// Suspend until the lock is taken.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Suspend until the lock is taken or `cancel` fires.
    ///
    /// On cancellation the wait degrades to a blocking acquire, so the
    /// caller still ends up holding the lock exactly once.
    pub async fn acquire_or_block(&self, cancel: &Cancellation) {
        loop {
            if self.try_acquire() {
                return;
            }
            if cancel.is_cancelled() {
                self.acquire_blocking();
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Release the lock.
    ///
    /// # Panics
    /// If the lock is not held.
    pub fn release(&self) {
        let mut state = self.state.lock();
        assert!(state.locked, "release of an unheld mutex");
        state.locked = false;
        state.blocking_holder = None;
        drop(state);
        self.released.notify_one();
    }

    // =========================================================================
    // Guards
    // =========================================================================

    pub fn lock_blocking(&self) -> MutexGuard<'_> {
        self.acquire_blocking();
        MutexGuard { mutex: self }
    }

    pub async fn lock(&self) -> MutexGuard<'_> {
        self.acquire().await;
        MutexGuard { mutex: self }
    }

    pub async fn lock_or_block(&self, cancel: &Cancellation) -> MutexGuard<'_> {
        self.acquire_or_block(cancel).await;
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_>> {
        self.try_acquire().then_some(MutexGuard { mutex: self })
    }
}

/// Releases the lock on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Enter the critical section, check nobody else is in it, leave.
    fn critical(inside: &AtomicUsize, entries: &AtomicUsize) {
        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders at once");
        std::thread::sleep(Duration::from_millis(2));
        entries.fetch_add(1, Ordering::SeqCst);
        inside.fetch_sub(1, Ordering::SeqCst);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_blocking_and_async_are_exclusive() {
        const BLOCKING: usize = 8;
        const ASYNC: usize = 8;

        let mutex = Arc::new(Mutex::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let entries = Arc::new(AtomicUsize::new(0));

        let mut threads = Vec::new();
        for _ in 0..BLOCKING {
            let (mutex, inside, entries) = (mutex.clone(), inside.clone(), entries.clone());
            threads.push(std::thread::spawn(move || {
                let _guard = mutex.lock_blocking();
                critical(&inside, &entries);
            }));
        }

        let mut tasks = Vec::new();
        for _ in 0..ASYNC {
            let (mutex, inside, entries) = (mutex.clone(), inside.clone(), entries.clone());
            tasks.push(tokio::spawn(async move {
                let _guard = mutex.lock().await;
                critical(&inside, &entries);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(entries.load(Ordering::SeqCst), BLOCKING + ASYNC);
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_try_lock() {
        let mutex = Mutex::new();
        let guard = mutex.try_lock();
        assert!(guard.is_some());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    #[should_panic(expected = "release of an unheld mutex")]
    fn test_release_unheld_panics() {
        Mutex::new().release();
    }

    #[test]
    #[should_panic(expected = "acquired twice")]
    fn test_blocking_reentry_panics() {
        let mutex = Mutex::new();
        let _first = mutex.lock_blocking();
        let _second = mutex.lock_blocking();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_wait_still_acquires_once() {
        let mutex = Arc::new(Mutex::new());
        mutex.acquire_blocking();

        let cancel = Cancellation::new();
        let waiter = {
            let (mutex, cancel) = (mutex.clone(), cancel.clone());
            tokio::spawn(async move {
                mutex.acquire_or_block(&cancel).await;
                mutex.release();
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        // Released from a different thread than the holder.
        let releaser = mutex.clone();
        std::thread::spawn(move || releaser.release()).join().unwrap();

        waiter.await.unwrap();
        assert!(!mutex.is_locked());
    }
}
