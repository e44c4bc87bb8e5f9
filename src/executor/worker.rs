//! The worker main loop: local pop, bounded steal, park, dispatch, complete.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::TaskloomError;
use crate::retry::{ExponentialBackoffDecider, IdleMan, IdleState};
use crate::runtime::{Runtime, Subflow};
use crate::task::{Node, Payload, TaskPriority, Topology};

use super::queue::WorkerQueue;
use super::ExecutorInner;

/// Bound on idle spin rounds between steal attempts before a worker commits
/// to parking on the `NotifierBus`.
const MAX_IDLE_SPINS: u32 = 24;

/// A single pool worker. Index is 0-based and stable for the worker's
/// lifetime; `WorkerInterface::scheduler_prologue`/`epilogue` receive it.
pub struct Worker {
    pub(crate) index: usize,
    pub(crate) queue: WorkerQueue,
}

impl Worker {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            queue: WorkerQueue::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Runs the worker loop on the calling (pool) thread until `shutdown` is
/// observed. Steals are attempted against every other worker's queue,
/// HIGH priority scanned across all victims before moving on to NORMAL,
/// then LOW.
pub fn run_loop(inner: Arc<ExecutorInner>, index: usize, shutdown: Arc<AtomicBool>) {
    if let Some(iface) = inner.interface.as_ref() {
        iface.scheduler_prologue(index);
    }

    let mut idle = IdleMan::new(
        MAX_IDLE_SPINS,
        ExponentialBackoffDecider::new(2, 0.5, Duration::from_micros(20), Duration::from_millis(4)),
    );

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        match next_task(&inner, index) {
            Some(node) => {
                idle.reset();
                dispatch(&inner, &node);
            }
            None => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                let token = inner.notifier.prepare_wait();
                if let Some(node) = next_task(&inner, index) {
                    inner.notifier.cancel_wait(token);
                    idle.reset();
                    dispatch(&inner, &node);
                    continue;
                }
                match idle.next_idle() {
                    IdleState::Ongoing(state) => {
                        inner.notifier.cancel_wait(token);
                        if let Some(state) = state {
                            if let Some(wait) = state.wait {
                                std::thread::sleep(wait);
                            }
                        }
                    }
                    IdleState::Expired => {
                        trace!(worker = index, "parking on notifier bus");
                        inner.notifier.commit_wait_timeout(token, Duration::from_millis(50));
                        idle.reset();
                    }
                }
            }
        }
    }

    if let Some(iface) = inner.interface.as_ref() {
        iface.scheduler_epilogue(index, None);
    }
}

fn next_task(inner: &Arc<ExecutorInner>, index: usize) -> Option<Arc<Node>> {
    if let Some(node) = inner.workers[index].queue.pop_local() {
        return Some(node);
    }
    steal_from_peers(inner, index)
}

fn steal_from_peers(inner: &Arc<ExecutorInner>, index: usize) -> Option<Arc<Node>> {
    let n = inner.workers.len();
    if n <= 1 {
        return None;
    }
    let start = fastrand::usize(0..n);
    for priority in TaskPriority::ALL {
        for offset in 0..n {
            let victim = (start + offset) % n;
            if victim == index {
                continue;
            }
            if let Some(node) = inner.workers[victim].queue.steal_at(priority) {
                debug!(worker = index, victim, ?priority, "stole task");
                return Some(node);
            }
        }
    }
    None
}

/// Steals from every worker's queues (HIGH across all victims, then NORMAL,
/// then LOW), with no excluded index and no local queue of its own. Used by
/// `corun_drive` so a thread blocked on a nested graph — whether a pool
/// worker re-entering via `Runtime::corun`/`Subflow::join`, or an outside
/// caller of `Executor::corun` — can make progress on *any* ready task
/// instead of idling.
fn steal_any(inner: &Arc<ExecutorInner>) -> Option<Arc<Node>> {
    let n = inner.workers.len();
    if n == 0 {
        return None;
    }
    let start = fastrand::usize(0..n);
    for priority in TaskPriority::ALL {
        for offset in 0..n {
            let victim = (start + offset) % n;
            if let Some(node) = inner.workers[victim].queue.steal_at(priority) {
                return Some(node);
            }
        }
    }
    None
}

/// Drives the pool's scheduling loop until `ready` reports true, servicing
/// whatever tasks it can steal in the meantime.
///
/// `corun`/`Subflow::join` must not block the worker outright: the worker
/// returns to its scheduling loop and picks up other work until the nested
/// graph completes. A worker re-entering through `Runtime::corun` keeps
/// executing tasks (its own or stolen) the whole time its nested graph is in
/// flight, rather than parking and leaving a single-worker pool deadlocked
/// on itself.
pub(crate) fn corun_drive(inner: &Arc<ExecutorInner>, mut ready: impl FnMut() -> bool) {
    let mut idle = IdleMan::new(
        MAX_IDLE_SPINS,
        ExponentialBackoffDecider::new(2, 0.5, Duration::from_micros(20), Duration::from_millis(4)),
    );
    loop {
        if ready() {
            return;
        }
        if let Some(node) = steal_any(inner) {
            idle.reset();
            dispatch(inner, &node);
            continue;
        }
        if ready() {
            return;
        }
        match idle.next_idle() {
            IdleState::Ongoing(Some(state)) => {
                if let Some(wait) = state.wait {
                    std::thread::sleep(wait);
                }
            }
            IdleState::Ongoing(None) => {}
            IdleState::Expired => {
                idle.reset();
                std::thread::yield_now();
            }
        }
    }
}

enum Branches {
    All,
    Some(Vec<usize>),
}

/// Dispatches a ready node: runs its payload (catching panics), then runs
/// the completion protocol appropriate to whether it belongs to a running
/// `Topology` (graph node) or stands alone (free async task).
pub(crate) fn dispatch(inner: &Arc<ExecutorInner>, node: &Arc<Node>) {
    let topology = node.topology.lock().unwrap().upgrade();
    match topology {
        Some(topology) => dispatch_in_topology(inner, node, topology),
        None => dispatch_free(inner, node),
    }
    inner.node_finished();
}

fn dispatch_in_topology(inner: &Arc<ExecutorInner>, node: &Arc<Node>, topology: Arc<Topology>) {
    if topology.is_cancelled() {
        complete_in_topology(inner, &topology);
        return;
    }

    if !acquire_semaphores(node) {
        return;
    }

    node.has_run.turn_on();
    let outcome = run_payload(inner, node, Some(&topology));
    release_semaphores(inner, node);

    match outcome {
        Ok(branches) => propagate(inner, node, &topology, branches),
        Err(err) => {
            warn!(?err, "task payload failed");
            topology.cancelled.store(true, Ordering::SeqCst);
            topology.record_failure(err);
        }
    }

    complete_in_topology(inner, &topology);
}

fn dispatch_free(inner: &Arc<ExecutorInner>, node: &Arc<Node>) {
    if !acquire_semaphores(node) {
        return;
    }

    node.has_run.turn_on();
    let outcome = run_payload(inner, node, None);
    release_semaphores(inner, node);

    if let Err(err) = outcome {
        warn!(?err, "async task payload panicked");
    }

    for waiter in node.complete_and_take_waiters() {
        inner.notify_dependent_ready(&waiter);
    }
}

fn run_payload(
    inner: &Arc<ExecutorInner>,
    node: &Arc<Node>,
    topology: Option<&Arc<Topology>>,
) -> Result<Branches, TaskloomError> {
    // `Runtime::current()` must resolve inside every kind of user-supplied
    // closure, not just the async ones — a plain `Static` graph task is as
    // much "the currently executing task" as an async payload is.
    // Installed once here rather than per-arm below.
    let _runtime_guard = Runtime::enter(inner.clone(), topology.cloned(), node.clone());

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut payload = node.payload.lock().unwrap();
        match &mut *payload {
            Payload::Placeholder => Branches::All,
            Payload::Static(f) => {
                f();
                Branches::All
            }
            Payload::Async(f) | Payload::SilentAsync(f) | Payload::DependentAsync(f) => {
                f();
                Branches::All
            }
            Payload::Condition(f) => Branches::Some(vec![f()]),
            Payload::MultiCondition(f) => Branches::Some(f()),
            Payload::Subflow(f) => {
                let topology = topology.expect("subflow payload always runs inside a topology");
                let mut subflow = Subflow::new(inner.clone(), topology.clone(), node.clone());
                f(&mut subflow);
                subflow.finish();
                Branches::All
            }
            Payload::Module(subgraph) => {
                let topology = topology.expect("module payload always runs inside a topology");
                inner.run_module(subgraph.clone(), topology);
                Branches::All
            }
        }
    }));

    result.map_err(|panic| {
        let message = panic_message(panic);
        TaskloomError::PayloadPanicked(message)
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task payload panicked with a non-string payload".to_string()
    }
}

fn acquire_semaphores(node: &Arc<Node>) -> bool {
    let sems = node.semaphores.lock().unwrap().clone();
    let mut acquired = node.acquired_semaphores.lock().unwrap();
    for sem in &sems {
        if acquired.iter().any(|held| Arc::ptr_eq(held, sem)) {
            continue;
        }
        if sem.try_acquire() {
            acquired.push(sem.clone());
        } else {
            sem.push_waiter(node.clone());
            return false;
        }
    }
    true
}

fn release_semaphores(inner: &Arc<ExecutorInner>, node: &Arc<Node>) {
    let mut acquired = node.acquired_semaphores.lock().unwrap();
    for sem in acquired.drain(..) {
        if let Some(waiter) = sem.release() {
            // `dispatch` already left `waiter` parked on this semaphore's
            // waiter list when its own turn at `acquire_semaphores` failed;
            // re-running the full sequence here (rather than just granting
            // the freed unit) is what lets a waiter blocked on more than
            // one semaphore make progress only once every one is held.
            if acquire_semaphores(&waiter) {
                inner.enqueue(waiter);
            }
        }
    }
}

/// Propagates `node`'s completion to its successors, enqueueing any that
/// become ready. Every node enqueued here is accounted for on `topology`'s
/// join counter first: the counter tracks how many nodes are currently in
/// flight for this round, not a static node count, since a cyclic
/// condition edge can put the same node in flight more than once per
/// round (`fire_conditional_edge`'s re-entry reset).
fn propagate(
    inner: &Arc<ExecutorInner>,
    node: &Arc<Node>,
    topology: &Arc<Topology>,
    branches: Branches,
) {
    match branches {
        Branches::All => {
            for successor in node.successors_snapshot() {
                if topology.is_cancelled() {
                    break;
                }
                if successor.decrement_join_counter() {
                    topology.account_extra_node();
                    inner.enqueue(successor);
                }
            }
        }
        Branches::Some(indices) => {
            let successors = node.successors_snapshot();
            for index in indices {
                let Some(successor) = successors.get(index) else {
                    topology.cancelled.store(true, Ordering::SeqCst);
                    topology.record_failure(TaskloomError::InvariantViolation(format!(
                        "condition task selected out-of-range successor index {index}"
                    )));
                    continue;
                };
                if topology.is_cancelled() {
                    break;
                }
                if successor.fire_conditional_edge() {
                    topology.account_extra_node();
                    inner.enqueue(successor.clone());
                }
            }
        }
    }
}

fn complete_in_topology(inner: &Arc<ExecutorInner>, topology: &Arc<Topology>) {
    if topology.node_completed() {
        inner.finish_topology(topology.clone());
    }
}
