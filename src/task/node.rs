//! The `Node`: a single task in a task graph.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use concurrent_queue::{ConcurrentQueue, PushError};

use crate::runtime::Subflow;
use crate::sync::{node_state, OnSignal, StateBits};

use super::graph::Graph;
use super::priority::TaskPriority;
use super::semaphore::Semaphore;
use super::topology::Topology;

/// The tagged payload a `Node` carries.
pub enum Payload {
    /// No-op placeholder, replaceable later via `Task::emplace_payload`.
    Placeholder,
    /// A plain task: runs once, has no influence on control flow.
    Static(Box<dyn FnMut() + Send>),
    /// Returns the index of the one successor to activate.
    Condition(Box<dyn FnMut() -> usize + Send>),
    /// Returns the indices of zero or more successors to activate.
    MultiCondition(Box<dyn FnMut() -> Vec<usize> + Send>),
    /// Spawns a dynamic child graph at runtime.
    Subflow(Box<dyn FnMut(&mut Subflow) + Send>),
    /// A composed subgraph entered as a nested topology.
    Module(Arc<Graph>),
    /// A free async task with an attached future (the closure resolves its
    /// own promise internally; see `Executor::async`).
    Async(Box<dyn FnMut() + Send>),
    /// A free async task with no future.
    SilentAsync(Box<dyn FnMut() + Send>),
    /// An async task gated on other `AsyncTask`s completing.
    DependentAsync(Box<dyn FnMut() + Send>),
}

impl Payload {
    pub fn is_conditional(&self) -> bool {
        matches!(self, Payload::Condition(_) | Payload::MultiCondition(_))
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Payload::Module(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Placeholder => "placeholder",
            Payload::Static(_) => "static",
            Payload::Condition(_) => "condition",
            Payload::MultiCondition(_) => "multi_condition",
            Payload::Subflow(_) => "subflow",
            Payload::Module(_) => "module",
            Payload::Async(_) => "async",
            Payload::SilentAsync(_) => "silent_async",
            Payload::DependentAsync(_) => "dependent_async",
        }
    }
}

/// A single task in a `Graph` (or a free-standing async task).
///
/// `Node`s are always held behind an `Arc`: the owning `Graph` (or, for
/// async tasks, the user's `AsyncTask` handle plus the executor's
/// dependent-async registry) holds the strong reference; `successors` and
/// `dependents` hold weak back-references. A node outlives every reference
/// in its successor/dependent lists because structural edits are forbidden
/// while a topology runs.
pub struct Node {
    pub(crate) name: Mutex<Option<String>>,
    pub(crate) payload: Mutex<Payload>,
    pub(crate) successors: Mutex<Vec<Weak<Node>>>,
    pub(crate) dependents: Mutex<Vec<Weak<Node>>>,
    /// Total incoming edge count, strong and conditional alike. A node with
    /// zero total incoming edges is a source; `num_strong_predecessors`
    /// alone undercounts a node reached only through a conditional edge.
    num_dependents: AtomicUsize,
    num_strong_predecessors: AtomicUsize,
    pub(crate) join_counter: AtomicUsize,
    priority: AtomicU8,
    pub(crate) semaphores: Mutex<Vec<Arc<Semaphore>>>,
    pub(crate) acquired_semaphores: Mutex<Vec<Arc<Semaphore>>>,
    pub(crate) topology: Mutex<Weak<Topology>>,
    pub(crate) parent: Mutex<Weak<Node>>,
    pub(crate) state: StateBits,
    /// Flipped the first time this node's payload runs in the current
    /// topology run; used to detect conditional cyclic re-entry so the
    /// join counter can be reset before being reused.
    pub(crate) has_run: OnSignal,
    /// Nodes created via `dependent_async` that are waiting on this node,
    /// closed (via `ConcurrentQueue::close`) the moment this node
    /// completes. A closed queue *is* this node's "completed" bit: a
    /// `push` that races a `close` is rejected atomically by the queue
    /// itself, so a waiter can never be left registered past the point its
    /// dependency has already drained its list (see
    /// `register_waiter_or_already_done`).
    pub(crate) async_waiters: ConcurrentQueue<Arc<Node>>,
    /// Remaining unsatisfied dependencies for a `dependent_async` node;
    /// unused by ordinary graph nodes.
    pub(crate) pending_async_deps: AtomicUsize,
}

impl Node {
    pub fn new(payload: Payload) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(None),
            payload: Mutex::new(payload),
            successors: Mutex::new(Vec::new()),
            dependents: Mutex::new(Vec::new()),
            num_dependents: AtomicUsize::new(0),
            num_strong_predecessors: AtomicUsize::new(0),
            join_counter: AtomicUsize::new(0),
            priority: AtomicU8::new(TaskPriority::Normal as u8),
            semaphores: Mutex::new(Vec::new()),
            acquired_semaphores: Mutex::new(Vec::new()),
            topology: Mutex::new(Weak::new()),
            parent: Mutex::new(Weak::new()),
            state: StateBits::new(),
            has_run: OnSignal::new(),
            async_waiters: ConcurrentQueue::unbounded(),
            pending_async_deps: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().unwrap() = Some(name.into());
    }

    pub fn priority(&self) -> TaskPriority {
        match self.priority.load(Ordering::Acquire) {
            0 => TaskPriority::High,
            2 => TaskPriority::Low,
            _ => TaskPriority::Normal,
        }
    }

    pub fn set_priority(&self, priority: TaskPriority) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    pub fn add_semaphore(&self, sem: Arc<Semaphore>) {
        self.semaphores.lock().unwrap().push(sem);
    }

    pub fn num_strong_predecessors(&self) -> usize {
        self.num_strong_predecessors.load(Ordering::Acquire)
    }

    /// Total incoming edge count (strong and conditional). Zero means this
    /// node is a source: nothing, not even a condition task, ever targets
    /// it, so it must be seeded at the start of every round.
    pub fn num_dependents(&self) -> usize {
        self.num_dependents.load(Ordering::Acquire)
    }

    pub fn successors_snapshot(&self) -> Vec<Arc<Node>> {
        self.successors
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn dependents_snapshot(&self) -> Vec<Arc<Node>> {
        self.dependents
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Adds a directed edge `self -> other`. Strong unless `self`'s payload
    /// is a condition task, in which case the edge is conditional and does
    /// not contribute to `other`'s initial join counter.
    pub fn add_edge(self: &Arc<Self>, other: &Arc<Node>) {
        let conditional = self.payload.lock().unwrap().is_conditional();
        self.successors.lock().unwrap().push(Arc::downgrade(other));
        other.dependents.lock().unwrap().push(Arc::downgrade(self));
        other.num_dependents.fetch_add(1, Ordering::AcqRel);
        if !conditional {
            other.num_strong_predecessors.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Resets per-run state: join counter back to the strong-predecessor
    /// count, all state bits cleared, and the re-entry marker cleared.
    pub fn reset_for_run(&self) {
        self.join_counter.store(
            self.num_strong_predecessors.load(Ordering::Acquire),
            Ordering::SeqCst,
        );
        self.state.reset();
        self.has_run.turn_off();
    }

    /// Sets the number of unsatisfied dependencies for a `dependent_async`
    /// node, returning whether it is already ready to enqueue (zero deps).
    pub fn set_pending_async_deps(&self, count: usize) -> bool {
        self.pending_async_deps.store(count, Ordering::SeqCst);
        count == 0
    }

    /// Decrements the remaining dependency count, returning `true` if this
    /// call brought it to zero.
    pub fn decrement_pending_async_deps(&self) -> bool {
        self.pending_async_deps.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Registers `waiter` to be notified when this (free, async) node
    /// completes. Returns `true` if this node has already completed
    /// instead (caller should treat the dependency as immediately
    /// satisfied).
    ///
    /// `ConcurrentQueue::push` and `::close` race safely against each
    /// other by construction: a `push` either lands before `close` (and is
    /// guaranteed to be visible to the subsequent drain in
    /// `complete_and_take_waiters`) or is rejected by an already-closed
    /// queue, in which case the node is guaranteed already complete. There
    /// is no window in which a registration can be silently dropped, unlike
    /// a naive `is_done()`-then-push two-step.
    pub fn register_waiter_or_already_done(self: &Arc<Self>, waiter: Arc<Node>) -> bool {
        matches!(self.async_waiters.push(waiter), Err(PushError::Closed(_)))
    }

    /// Closes this node's waiter queue and drains it. Only meaningful for
    /// free async nodes (`spawn_async`/`spawn_silent_async`/
    /// `spawn_dependent_async`); graph nodes never have registered waiters
    /// since `AsyncTask` handles are never issued for them.
    pub fn complete_and_take_waiters(&self) -> Vec<Arc<Node>> {
        self.async_waiters.close();
        let mut waiters = Vec::with_capacity(self.async_waiters.len());
        while let Ok(waiter) = self.async_waiters.pop() {
            waiters.push(waiter);
        }
        waiters
    }

    /// Whether this (free, async) node has completed.
    pub fn is_done(&self) -> bool {
        self.async_waiters.is_closed()
    }

    pub fn is_ready(&self) -> bool {
        self.join_counter.load(Ordering::Acquire) == 0
    }

    /// Decrements the join counter by one, returning `true` if this call
    /// brought it to zero (the node is now ready to enqueue).
    ///
    /// If this node has already completed once in the current topology run
    /// (it sits downstream of a condition task inside a cycle, re-entered
    /// through an ordinary strong edge), its counter is first reset to the
    /// strong-predecessor baseline: otherwise an already-exhausted counter
    /// would wrap past zero on the next decrement and never report ready
    /// again.
    pub fn decrement_join_counter(&self) -> bool {
        if self.has_run.probe() {
            self.join_counter.store(
                self.num_strong_predecessors.load(Ordering::Acquire),
                Ordering::SeqCst,
            );
        }
        self.join_counter.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Fires a conditional (weak) edge into this node. A node with no
    /// strong predecessors at all is only ever reached this way and has no
    /// dependency left to wait on, so it is ready the instant it is
    /// selected — whether this is its first activation or a cyclic repeat.
    /// Otherwise this defers to `decrement_join_counter`'s own has-run
    /// reset, since the node also has strong edges feeding it.
    pub fn fire_conditional_edge(&self) -> bool {
        if self.num_strong_predecessors.load(Ordering::Acquire) == 0 {
            return true;
        }
        self.decrement_join_counter()
    }

    pub fn mark_ready(&self) {
        self.state.set(node_state::READY);
    }

    pub fn mark_detached(&self) {
        self.state.set(node_state::DETACHED);
    }

    pub fn is_detached(&self) -> bool {
        self.state.has(node_state::DETACHED)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("kind", &self.payload.lock().unwrap().kind_name())
            .field(
                "join_counter",
                &self.join_counter.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// Identity-based equality/hash: two handles are equal exactly when they
/// point at the same underlying node.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self as *const Node).hash(state)
    }
}
