//! Per-worker, priority-indexed work queue.
//!
//! Each priority level is a double-ended queue: the owning worker pushes and
//! pops LIFO from one end, stealers pop FIFO from the other. Backed by a
//! `Mutex<VecDeque<_>>` rather than a lock-free CAS deque — the same
//! owner-pushes/pops-one-end, stealers-pop-the-other protocol, with a
//! coarser but safe synchronization primitive. See DESIGN.md for the
//! tradeoff against a literal Chase-Lev deque.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::task::{Node, TaskPriority, MAX_PRIORITY};

struct PriorityDeque {
    items: Mutex<VecDeque<Arc<Node>>>,
    len: AtomicUsize,
}

impl PriorityDeque {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    fn push_local(&self, node: Arc<Node>) {
        self.items.lock().unwrap().push_back(node);
        self.len.fetch_add(1, Ordering::Release);
    }

    /// Owner pop: LIFO, from the same end `push_local` appends to.
    fn pop_local(&self) -> Option<Arc<Node>> {
        let mut guard = self.items.lock().unwrap();
        let popped = guard.pop_back();
        if popped.is_some() {
            self.len.fetch_sub(1, Ordering::Release);
        }
        popped
    }

    /// Thief pop: FIFO, from the opposite end.
    fn steal(&self) -> Option<Arc<Node>> {
        let mut guard = self.items.lock().unwrap();
        let stolen = guard.pop_front();
        if stolen.is_some() {
            self.len.fetch_sub(1, Ordering::Release);
        }
        stolen
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

/// A worker's three priority-ordered deques.
pub struct WorkerQueue {
    priorities: [PriorityDeque; MAX_PRIORITY],
}

impl Default for WorkerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerQueue {
    pub fn new() -> Self {
        Self {
            priorities: [
                PriorityDeque::new(),
                PriorityDeque::new(),
                PriorityDeque::new(),
            ],
        }
    }

    pub fn push(&self, node: Arc<Node>) {
        let priority = node.priority();
        self.priorities[priority.as_index()].push_local(node);
    }

    /// Local pop: HIGH, then NORMAL, then LOW.
    pub fn pop_local(&self) -> Option<Arc<Node>> {
        for priority in TaskPriority::ALL {
            if let Some(node) = self.priorities[priority.as_index()].pop_local() {
                return Some(node);
            }
        }
        None
    }

    /// Steal at a specific priority level only (used when a victim scan is
    /// walking HIGH-across-all-victims before moving to NORMAL).
    pub fn steal_at(&self, priority: TaskPriority) -> Option<Arc<Node>> {
        self.priorities[priority.as_index()].steal()
    }

    pub fn is_empty(&self) -> bool {
        TaskPriority::ALL
            .iter()
            .all(|p| self.priorities[p.as_index()].len() == 0)
    }

    pub fn len(&self) -> usize {
        TaskPriority::ALL
            .iter()
            .map(|p| self.priorities[p.as_index()].len())
            .sum()
    }
}
