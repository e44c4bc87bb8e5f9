//! `Runtime` and `Subflow`: the in-task APIs available to a currently
//! executing payload.
//!
//! Workers reference their owning executor through a per-thread pointer set
//! on entry — here that pointer is a thread-local `Runtime`, installed for
//! the duration of a single payload invocation by `Runtime::enter` and torn
//! down on drop.

use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::async_task::AsyncTask;
use crate::error::TaskloomError;
use crate::executor::future::{self, Future};
use crate::executor::ExecutorInner;
use crate::task::{Graph, Node, Payload, TaskPriority, Topology};

thread_local! {
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// In-task API for the node currently executing on this worker thread.
///
/// Spawned via `Runtime::async`/`silent_async`, children are ordinary
/// executor-level async tasks: unless the caller explicitly calls `join()`
/// before the payload returns, they run independently and do not gate the
/// enclosing topology's completion. See `DESIGN.md` for the rationale.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<ExecutorInner>,
    /// `None` for a free task (one dispatched outside any `Topology`, e.g.
    /// an `Executor::async`/`silent_async` payload not spawned via
    /// `Runtime::async_task`/`silent_async`); `Runtime::schedule` is the
    /// only operation that requires this to be `Some`.
    topology: Option<Arc<Topology>>,
    node: Arc<Node>,
}

/// RAII guard installing a `Runtime` as the thread's current one for the
/// duration of a payload call, restoring whatever was current before on
/// drop rather than clearing it outright.
///
/// This matters for reentrant dispatch: `corun_drive` (used by both
/// `Runtime::corun` and `Subflow::join`) may run an unrelated node's payload
/// — with its own `Runtime::enter` guard — on the same thread while a
/// task's own payload is still on the call stack waiting for its nested
/// graph to finish. Without restoring the previous value, that inner
/// dispatch's guard would clear the outer task's `Runtime` out from under
/// it the moment the inner payload returns.
pub(crate) struct RuntimeGuard {
    previous: Option<Runtime>,
}

impl Runtime {
    pub(crate) fn enter(inner: Arc<ExecutorInner>, topology: Option<Arc<Topology>>, node: Arc<Node>) -> RuntimeGuard {
        let previous = CURRENT.with(|cell| {
            cell.borrow_mut().replace(Runtime {
                inner,
                topology,
                node,
            })
        });
        RuntimeGuard { previous }
    }

    /// Returns the `Runtime` for the task currently executing on this
    /// thread. Panics if called outside of a task payload.
    pub fn current() -> Runtime {
        CURRENT
            .with(|cell| cell.borrow().clone())
            .expect("Runtime::current() called outside of a running task payload")
    }

    /// Forcibly marks `node` ready now, bypassing its join counter. `node`
    /// must belong to the same topology as the currently executing task.
    /// Panics if the currently executing task is a free task (no enclosing
    /// topology) — there is no topology for `node` to belong to.
    pub fn schedule(&self, node: &Arc<Node>) {
        let topology = self
            .topology
            .as_ref()
            .expect("Runtime::schedule called from a free (topology-less) task");
        debug_assert!(
            node.topology
                .lock()
                .unwrap()
                .upgrade()
                .map(|t| Arc::ptr_eq(&t, topology))
                .unwrap_or(false),
            "Runtime::schedule target must belong to the current topology"
        );
        // Bypasses the join counter entirely, so it must account for the
        // node going in flight itself rather than relying on `propagate`'s
        // accounting (which only fires when a node's own counter reaches
        // zero through the normal decrement path).
        topology.account_extra_node();
        self.inner.enqueue(node.clone());
    }

    /// Runs `graph` to completion inline: blocks the currently executing
    /// payload, but drives the worker's own scheduling loop (its queue and
    /// steals) the whole time rather than parking — see `Executor::corun`
    /// for the same non-blocking-suspension behavior.
    pub fn corun(&self, graph: Arc<Graph>) -> Result<(), TaskloomError> {
        self.inner.corun_blocking(graph)
    }

    pub fn async_task<R>(&self, f: impl FnMut() -> R + Send + 'static) -> (AsyncTask, Future<R>)
    where
        R: Send + 'static,
    {
        self.inner.spawn_async(f)
    }

    pub fn silent_async(&self, f: impl FnMut() + Send + 'static) -> AsyncTask {
        self.inner.spawn_silent_async(f)
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| {
            *cell.borrow_mut() = self.previous.take();
        });
    }
}

/// A dynamic child graph created by a `Subflow`-payload task while it
/// runs. Children are full graph nodes sharing the parent's `Topology`:
/// their join counters are pre-initialized to zero (no predecessors) and
/// the topology's own counter is extended to account for them before they
/// are enqueued.
pub struct Subflow {
    inner: Arc<ExecutorInner>,
    topology: Arc<Topology>,
    pending: Vec<Arc<Node>>,
    detached: bool,
}

impl Subflow {
    pub(crate) fn new(inner: Arc<ExecutorInner>, topology: Arc<Topology>, _parent: Arc<Node>) -> Self {
        Self {
            inner,
            topology,
            pending: Vec::new(),
            detached: false,
        }
    }

    /// Emplaces a dynamic child task. Returned handle may have edges added
    /// via `Node::add_edge` before the next `join()`/return, letting the
    /// subflow build a small internal dependency chain of its own.
    pub fn emplace(&mut self, f: impl FnMut() + Send + 'static) -> Arc<Node> {
        let node = Node::new(Payload::Static(Box::new(f)));
        *node.topology.lock().unwrap() = Arc::downgrade(&self.topology);
        self.pending.push(node.clone());
        node
    }

    pub fn priority(&mut self, node: &Arc<Node>, level: TaskPriority) {
        node.set_priority(level);
    }

    /// Marks this subflow detached: any tasks emplaced so far (and any
    /// emplaced afterwards) run independently and do not block this
    /// subflow's own task from completing.
    pub fn detached(&mut self) {
        self.detached = true;
    }

    /// Blocks until every task emplaced so far on this subflow completes.
    /// Implemented by chaining a synthetic barrier node after the pending
    /// set and driving the scheduling loop until it fires: the worker
    /// returns to servicing other work (its own queue or stolen) rather
    /// than parking, exactly as `Runtime::corun` does.
    pub fn join(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return;
        }

        let barrier = Node::new(Payload::Placeholder);
        *barrier.topology.lock().unwrap() = Arc::downgrade(&self.topology);

        let (promise, future) = future::channel::<()>();
        let promise_slot = std::sync::Mutex::new(Some(promise));
        *barrier.payload.lock().unwrap() = Payload::Static(Box::new(move || {
            if let Some(p) = promise_slot.lock().unwrap().take() {
                p.resolve(());
            }
        }));

        for node in &pending {
            node.add_edge(&barrier);
        }
        barrier.join_counter.store(pending.len(), Ordering::SeqCst);

        // Each pending child is enqueued directly here (bypassing
        // `propagate`), so it is accounted for here too. The barrier itself
        // is not enqueued directly — it becomes ready only once the last
        // child's completion decrements its join counter to zero — so its
        // accounting happens there, in `propagate`, like any other
        // successor becoming ready.
        for node in &pending {
            self.topology.account_extra_node();
            self.inner.enqueue(node.clone());
        }

        self.inner.drive_until(|| future.is_ready());
        let _ = future.get();
    }

    pub(crate) fn finish(mut self) {
        if self.detached {
            let pending = std::mem::take(&mut self.pending);
            for node in pending {
                self.topology.account_extra_node();
                self.inner.enqueue(node);
            }
        } else {
            self.join();
        }
    }
}

