//! `NotifierBus`: the parking primitive workers use when they find no work.
//!
//! Implements the `prepare_wait` / `commit_wait` / `cancel_wait` /
//! `notify_one` / `notify_all` protocol, following the shape of Eigen's
//! EventCount algorithm. Built on a condvar-plus-mutex primitive, with an
//! epoch counter added so a worker that is between `prepare_wait` and
//! `commit_wait` never misses a notification that happened in that window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Token returned by `prepare_wait`, redeemed by `commit_wait` or
/// `cancel_wait`.
#[derive(Debug, Clone, Copy)]
pub struct WaitToken {
    epoch: u64,
}

#[derive(Default)]
struct Inner {
    parked: usize,
}

pub struct NotifierBus {
    epoch: AtomicU64,
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for NotifierBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifierBus {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            inner: Mutex::new(Inner::default()),
            cv: Condvar::new(),
        }
    }

    /// Publishes intent to wait. The caller must re-check its queues after
    /// this call and before `commit_wait`; any push that happens after
    /// `prepare_wait` is guaranteed to bump the epoch and thus be observed.
    #[inline]
    pub fn prepare_wait(&self) -> WaitToken {
        let epoch = self.epoch.load(Ordering::SeqCst);
        WaitToken { epoch }
    }

    /// Cancels a previously prepared wait: the caller found work during its
    /// re-check and is not going to park.
    #[inline]
    pub fn cancel_wait(&self, _token: WaitToken) {}

    /// Parks until the epoch has moved past the one observed by
    /// `prepare_wait`, i.e. until some thread has called `notify_*` since.
    pub fn commit_wait(&self, token: WaitToken) {
        let mut guard = self.inner.lock().unwrap();
        guard.parked += 1;
        while self.epoch.load(Ordering::SeqCst) == token.epoch {
            guard = self.cv.wait(guard).unwrap();
        }
        guard.parked -= 1;
    }

    /// Same as `commit_wait` but bounded, returns `true` if woken by a
    /// notification and `false` on timeout.
    pub fn commit_wait_timeout(&self, token: WaitToken, dur: Duration) -> bool {
        let mut guard = self.inner.lock().unwrap();
        guard.parked += 1;
        let mut woke = false;
        loop {
            if self.epoch.load(Ordering::SeqCst) != token.epoch {
                woke = true;
                break;
            }
            let (next, timeout_result) = self.cv.wait_timeout(guard, dur).unwrap();
            guard = next;
            if timeout_result.timed_out() {
                break;
            }
        }
        guard.parked -= 1;
        woke
    }

    /// Bumps the epoch and wakes a single parked worker, if any.
    pub fn notify_one(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let guard = self.inner.lock().unwrap();
        if guard.parked > 0 {
            self.cv.notify_one();
        }
    }

    /// Bumps the epoch and wakes every parked worker.
    pub fn notify_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let guard = self.inner.lock().unwrap();
        if guard.parked > 0 {
            self.cv.notify_all();
        }
    }

    #[cfg(test)]
    pub(crate) fn parked_count(&self) -> usize {
        self.inner.lock().unwrap().parked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn notify_wakes_parked_waiter() {
        let bus = Arc::new(NotifierBus::new());
        let bus2 = bus.clone();

        let token = bus.prepare_wait();
        let handle = thread::spawn(move || {
            bus2.commit_wait(token);
        });

        // give the waiter a chance to park
        thread::sleep(Duration::from_millis(50));
        bus.notify_all();
        handle.join().unwrap();
    }

    #[test]
    fn cancel_wait_is_a_no_op() {
        let bus = NotifierBus::new();
        let token = bus.prepare_wait();
        bus.cancel_wait(token);
        assert_eq!(bus.parked_count(), 0);
    }

    #[test]
    fn timeout_returns_false_without_notify() {
        let bus = NotifierBus::new();
        let token = bus.prepare_wait();
        let woke = bus.commit_wait_timeout(token, Duration::from_millis(20));
        assert!(!woke);
    }
}
