//! Single-assignment future.
//!
//! A `Deferred<T>` starts empty with its gate locked. The first completion
//! stores the value and releases the gate; waiters pass through the gate
//! one at a time and read the value.

use super::Mutex;

#[derive(Debug)]
pub struct Deferred<T> {
    gate: Mutex,
    value: parking_lot::Mutex<Option<T>>,
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new_locked(),
            value: parking_lot::Mutex::new(None),
        }
    }

    /// Store the value.
    ///
    /// # Panics
    /// If the deferred was already completed.
    pub fn complete(&self, value: T) {
        assert!(self.try_complete(value), "deferred completed twice");
    }

    /// Store the value unless another completion got there first.
    ///
    /// Returns false when already completed.
    pub fn try_complete(&self, value: T) -> bool {
        {
            let mut slot = self.value.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.gate.release();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Value if already completed.
    pub fn try_get(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Suspend until completed, then return a clone of the value.
    pub async fn value(&self) -> T {
        let _pass = self.gate.lock().await;
        match self.value.lock().clone() {
            Some(value) => value,
            None => unreachable!("deferred gate opened without a value"),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiters_receive_value() {
        let deferred = Arc::new(Deferred::<u32>::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let deferred = deferred.clone();
                tokio::spawn(async move { deferred.value().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!deferred.is_complete());
        deferred.complete(42);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), 42);
        }
        // Completed deferreds answer immediately.
        assert_eq!(deferred.value().await, 42);
    }

    #[test]
    fn test_try_complete_first_wins() {
        let deferred = Deferred::new();
        assert!(deferred.try_complete("first"));
        assert!(!deferred.try_complete("second"));
        assert_eq!(deferred.try_get(), Some("first"));
    }

    #[test]
    #[should_panic(expected = "completed twice")]
    fn test_complete_twice_panics() {
        let deferred = Deferred::new();
        deferred.complete(1);
        deferred.complete(2);
    }
}
