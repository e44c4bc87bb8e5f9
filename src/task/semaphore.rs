//! Counting semaphore with a FIFO waiter list of blocked `Node`s.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::node::Node;

/// A counting resource. Nodes that list a `Semaphore` in their `semaphores`
/// set must acquire every one of them before their payload runs, and
/// release every one after — release happens before the successor
/// join-counter decrement.
pub struct Semaphore {
    max_count: usize,
    held: AtomicUsize,
    waiters: Mutex<VecDeque<Arc<Node>>>,
}

impl Semaphore {
    pub fn new(max_count: usize) -> Arc<Self> {
        assert!(max_count > 0, "Semaphore max_count must be positive");
        Arc::new(Self {
            max_count,
            held: AtomicUsize::new(0),
            waiters: Mutex::new(VecDeque::new()),
        })
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn available(&self) -> usize {
        self.max_count - self.held.load(Ordering::Acquire)
    }

    /// Attempts to acquire one unit, returning `true` on success.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut current = self.held.load(Ordering::Acquire);
        loop {
            if current >= self.max_count {
                return false;
            }
            match self.held.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn force_release(&self) {
        self.held.fetch_sub(1, Ordering::AcqRel);
    }

    /// Registers `node` as blocked on this semaphore; it is woken (returned
    /// from `release`) in FIFO order relative to other waiters.
    pub(crate) fn push_waiter(&self, node: Arc<Node>) {
        self.waiters.lock().unwrap().push_back(node);
    }

    /// Releases one unit and, if a waiter is queued, hands it back to the
    /// caller so the executor can retry its full acquisition sequence.
    pub(crate) fn release(&self) -> Option<Arc<Node>> {
        self.force_release();
        self.waiters.lock().unwrap().pop_front()
    }
}
