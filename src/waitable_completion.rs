//! Completion signal for frames handed to the transport.
//!
//! A send frame resets the signal when a slot becomes pending and the
//! transport side signals it once the slot has been consumed. Any thread may
//! block on the signal with a timeout.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Condvar, Mutex,
    },
    time::Duration,
};

/// A completion flag with blocking, timed waits.
///
/// The flag itself is atomic so [`WaitableCompletion::is_complete`] never
/// blocks. The mutex only serialises sleepers against the notifier; it never
/// guards other data, so signalling while holding an unrelated lock can not
/// deadlock.
///
/// # Example
///
/// ```ignore
/// use std::{sync::Arc, thread, time::Duration};
/// use ndi_framekit::waitable_completion::WaitableCompletion;
///
/// let completion = Arc::new(WaitableCompletion::new());
/// let signaller = Arc::clone(&completion);
/// thread::spawn(move || {
///     thread::sleep(Duration::from_millis(10));
///     signaller.signal();
/// });
/// assert!(completion.wait_timeout(Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct WaitableCompletion {
    completed: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl Default for WaitableCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitableCompletion {
    /// Creates a signal in the incomplete state.
    pub fn new() -> Self {
        Self::with_state(false)
    }

    /// Creates a signal in the completed state, i.e. nothing pending.
    pub fn new_completed() -> Self {
        Self::with_state(true)
    }

    fn with_state(completed: bool) -> Self {
        Self {
            completed: AtomicBool::new(completed),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Marks completion and wakes every waiter.
    ///
    /// Repeated calls are harmless.
    pub fn signal(&self) {
        self.completed.store(true, Ordering::Release);
        let _lock = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.cv.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns the signal to the incomplete state for the next pending send.
    pub fn reset(&self) {
        self.completed.store(false, Ordering::Release);
    }

    /// Blocks until completion or until `timeout` elapses.
    ///
    /// Returns `true` when the signal completed, `false` on timeout. A
    /// poisoned lock is recovered and the wait continues.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (_guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, |_| !self.is_complete())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !result.timed_out() || self.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_states() {
        assert!(!WaitableCompletion::new().is_complete());
        assert!(WaitableCompletion::new_completed().is_complete());
    }

    #[test]
    fn test_signal_and_reset() {
        let wc = WaitableCompletion::new();
        wc.signal();
        assert!(wc.is_complete());
        wc.reset();
        assert!(!wc.is_complete());
        wc.signal();
        wc.signal();
        assert!(wc.is_complete());
    }

    #[test]
    fn test_signal_before_wait() {
        let wc = WaitableCompletion::new();
        wc.signal();
        assert!(wc.wait_timeout(Duration::from_millis(100)));
    }

    #[test]
    fn test_wait_then_signal() {
        let wc = Arc::new(WaitableCompletion::new());
        let wc_clone = Arc::clone(&wc);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            wc_clone.signal();
        });

        assert!(wc.wait_timeout(Duration::from_secs(1)));
        handle.join().unwrap();
    }

    #[test]
    fn test_timeout_expires() {
        let wc = WaitableCompletion::new();
        assert!(!wc.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_concurrent_signal_and_wait() {
        for _ in 0..100 {
            let wc = Arc::new(WaitableCompletion::new());
            let wc_clone = Arc::clone(&wc);

            let signaler = thread::spawn(move || {
                wc_clone.signal();
            });

            let completed = wc.wait_timeout(Duration::from_secs(1));
            signaler.join().unwrap();
            assert!(completed);
        }
    }
}
