//! `Future`/`Promise`: the caller-visible completion handle.
//!
//! A `Mutex` guarding a three-state slot plus a `Condvar`, rather than
//! pulling in an async runtime this crate has no other use for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::TaskloomError;

enum Slot<T> {
    Pending,
    Ready(Result<T, TaskloomError>),
    Taken,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    cv: Condvar,
    cancelled: Arc<AtomicBool>,
}

/// The producer side, held by whatever code will eventually have a result
/// (a `Topology`'s completion callback, an async task's wrapper closure).
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// The consumer side, returned to the caller of `run`/`async`/etc.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
    cancelled: Arc<AtomicBool>,
}

/// Creates a connected `Promise`/`Future` pair, with a shared cancellation
/// flag a `Topology` can also observe.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    channel_with_cancel_flag(Arc::new(AtomicBool::new(false)))
}

pub fn channel_with_cancel_flag<T>(cancel_flag: Arc<AtomicBool>) -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        cv: Condvar::new(),
        cancelled: cancel_flag.clone(),
    });
    (
        Promise {
            shared: shared.clone(),
        },
        Future {
            shared,
            cancelled: cancel_flag,
        },
    )
}

impl<T> Promise<T> {
    /// Resolves the future with a success value. A second call is a no-op:
    /// "exactly one exception (or result) per topology run is captured."
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: TaskloomError) {
        self.settle(Err(err));
    }

    fn settle(self, result: Result<T, TaskloomError>) {
        let mut slot = self.shared.slot.lock().unwrap();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Ready(result);
        }
        drop(slot);
        self.shared.cv.notify_all();
    }
}

impl<T> Future<T> {
    /// Blocks until resolved, consuming the future and returning its
    /// result (or the captured panic, wrapped as `TaskloomError`).
    pub fn get(self) -> Result<T, TaskloomError> {
        let mut slot = self.shared.slot.lock().unwrap();
        loop {
            match &*slot {
                Slot::Ready(_) => break,
                _ => slot = self.shared.cv.wait(slot).unwrap(),
            }
        }
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(result) => result,
            _ => unreachable!("result slot was ready under the lock"),
        }
    }

    /// Non-blocking peek: `true` once a result has been settled, without
    /// consuming it. Used by `corun`/`Subflow::join` to drive the caller's
    /// own scheduling loop instead of parking on this future's condvar.
    pub fn is_ready(&self) -> bool {
        !matches!(*self.shared.slot.lock().unwrap(), Slot::Pending)
    }

    /// Blocks until resolved without consuming the future.
    pub fn wait(&self) {
        let mut slot = self.shared.slot.lock().unwrap();
        while matches!(*slot, Slot::Pending) {
            slot = self.shared.cv.wait(slot).unwrap();
        }
    }

    /// Blocks up to `dur`, returning whether the future resolved in time.
    pub fn wait_for(&self, dur: Duration) -> bool {
        let mut slot = self.shared.slot.lock().unwrap();
        let mut remaining = dur;
        loop {
            if !matches!(*slot, Slot::Pending) {
                return true;
            }
            let started = std::time::Instant::now();
            let (next, timeout) = self.shared.cv.wait_timeout(slot, remaining).unwrap();
            slot = next;
            if !matches!(*slot, Slot::Pending) {
                return true;
            }
            if timeout.timed_out() {
                return false;
            }
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }

    /// Requests cancellation of the owning `Topology`. Running tasks are
    /// not interrupted; no new tasks are scheduled from that topology, and
    /// the topology still drains and resolves normally with
    /// `is_cancelled() == true`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn resolves_and_reads_back() {
        let (promise, future) = channel::<i32>();
        promise.resolve(42);
        assert_eq!(future.get().unwrap(), 42);
    }

    #[test]
    fn blocks_until_resolved_from_another_thread() {
        let (promise, future) = channel::<&'static str>();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            promise.resolve("done");
        });
        assert_eq!(future.get().unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn cancel_is_observable_without_interrupting_result() {
        let (promise, future) = channel::<()>();
        future.cancel();
        assert!(future.is_cancelled());
        promise.resolve(());
        assert!(future.get().is_ok());
    }

    #[test]
    fn wait_for_times_out_then_succeeds() {
        let (promise, future) = channel::<()>();
        assert!(!future.wait_for(Duration::from_millis(10)));
        promise.resolve(());
        assert!(future.wait_for(Duration::from_millis(10)));
    }
}
