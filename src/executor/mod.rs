//! The worker pool: construction, submission API, scheduling, lifecycle.

mod builder;
pub mod future;
mod queue;
mod worker;

pub use builder::ExecutorBuilder;
pub use future::Future;
pub use worker::Worker;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::info;

use crate::async_task::AsyncTask;
use crate::error::TaskloomError;
use crate::sync::NotifierBus;
use crate::task::{Graph, Node, Payload, RunOutcome, Topology};

use future::Promise;
use worker::Worker as WorkerState;

/// Strategy object wrapping a worker's entry/exit.
pub trait WorkerInterface: Send + Sync {
    /// Invoked once before a worker's scheduling loop begins.
    fn scheduler_prologue(&self, _worker: usize) {}
    /// Invoked once after a worker's scheduling loop ends; `error` carries
    /// a captured `TaskloomError` if the worker thread's own logic failed
    /// (not a task payload panic, which is delivered through futures).
    fn scheduler_epilogue(&self, _worker: usize, _error: Option<&TaskloomError>) {}
}

/// Shared state reachable from worker threads, `Runtime`, and `Subflow`.
/// Lives for as long as any `Executor` handle or spawned thread references
/// it.
pub struct ExecutorInner {
    pub(crate) workers: Vec<WorkerState>,
    pub(crate) notifier: NotifierBus,
    pub(crate) interface: Option<Arc<dyn WorkerInterface>>,
    next_worker: AtomicUsize,
    outstanding: AtomicUsize,
    drain_notifier: NotifierBus,
}

impl ExecutorInner {
    fn new(num_workers: usize, interface: Option<Arc<dyn WorkerInterface>>) -> Arc<Self> {
        let workers = (0..num_workers).map(WorkerState::new).collect();
        Arc::new(Self {
            workers,
            notifier: NotifierBus::new(),
            interface,
            next_worker: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            drain_notifier: NotifierBus::new(),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Pushes a ready node onto a worker queue, round-robin when there is
    /// no particular affinity, and wakes a parked worker.
    pub(crate) fn enqueue(&self, node: Arc<Node>) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        node.mark_ready();
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len().max(1);
        self.workers[index].queue.push(node);
        self.notifier.notify_one();
    }

    /// Called once a node has fully finished (graph node: propagated and
    /// topology-accounted; free node: payload returned and waiters
    /// notified).
    pub(crate) fn node_finished(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drain_notifier.notify_all();
        }
    }

    pub(crate) fn notify_dependent_ready(&self, waiter: &Arc<Node>) {
        if waiter.decrement_pending_async_deps() {
            self.enqueue(waiter.clone());
        }
    }

    /// Submits `graph` under a fresh `Topology` governed by `predicate`
    /// (returns `true` when the run series is done) and `completion_cb`.
    pub(crate) fn submit(
        self: &Arc<Self>,
        graph: Arc<Graph>,
        predicate: Box<dyn FnMut() -> bool + Send>,
        completion_cb: Option<Box<dyn FnOnce() + Send>>,
    ) -> Future<RunOutcome> {
        if !graph.try_begin_run() {
            let (promise, future) = future::channel();
            promise.reject(TaskloomError::AlreadyRunning);
            return future;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let (promise, future) = future::channel_with_cancel_flag(cancelled.clone());
        let topology = Topology::new(graph, predicate, completion_cb, promise, cancelled);
        self.begin_round(topology);
        future
    }

    fn begin_round(self: &Arc<Self>, topology: Arc<Topology>) {
        let sources = topology.reset_round();
        if topology.graph.is_empty() {
            self.finish_topology(topology);
            return;
        }
        for source in sources {
            self.enqueue(source);
        }
    }

    /// Called whenever a topology's join counter reaches zero for the
    /// current round: evaluates the predicate and either starts another
    /// round or resolves the run's promise.
    pub(crate) fn finish_topology(self: &Arc<Self>, topology: Arc<Topology>) {
        if topology.predicate_done() {
            topology.graph.end_run();
            topology.run_completion_callback();
            if let Some(promise) = topology.take_result_promise() {
                match topology.take_failure() {
                    Some(err) => promise.reject(err),
                    None => promise.resolve(RunOutcome {
                        cancelled: topology.is_cancelled(),
                    }),
                }
            }
        } else {
            self.begin_round(topology);
        }
    }

    /// Enters `subgraph` as a nested run, blocking until it completes.
    /// Serializes concurrent module entries over the same subgraph via
    /// `Graph::lock_for_module_entry` rather than giving each invocation
    /// its own copy of the subgraph (see `DESIGN.md`).
    pub(crate) fn run_module(self: &Arc<Self>, subgraph: Arc<Graph>, outer: &Arc<Topology>) {
        let _guard = subgraph.lock_for_module_entry();
        let nested = self.submit(subgraph, Box::new(|| true), None);
        match nested.get() {
            Ok(outcome) => {
                if outcome.cancelled {
                    outer.cancelled.store(true, Ordering::SeqCst);
                }
            }
            Err(err) => {
                outer.cancelled.store(true, Ordering::SeqCst);
                outer.record_failure(err);
            }
        }
    }

    /// Blocks the calling thread on `graph`'s completion, but services other
    /// ready tasks in the meantime rather than parking outright. See
    /// `worker::corun_drive`.
    pub(crate) fn corun_blocking(self: &Arc<Self>, graph: Arc<Graph>) -> Result<(), TaskloomError> {
        let future = self.submit(graph, Box::new(|| true), None);
        self.drive_until(|| future.is_ready());
        future.get().map(|_| ())
    }

    pub(crate) fn spawn_async<R>(
        self: &Arc<Self>,
        mut f: impl FnMut() -> R + Send + 'static,
    ) -> (AsyncTask, Future<R>)
    where
        R: Send + 'static,
    {
        let (promise, future) = future::channel::<R>();
        let promise_slot = Mutex::new(Some(promise));
        let node = Node::new(Payload::Async(Box::new(move || {
            let value = f();
            if let Some(p) = promise_slot.lock().unwrap().take() {
                p.resolve(value);
            }
        })));
        self.enqueue(node.clone());
        (AsyncTask::new(node), future)
    }

    pub(crate) fn spawn_silent_async(
        self: &Arc<Self>,
        f: impl FnMut() + Send + 'static,
    ) -> AsyncTask {
        let node = Node::new(Payload::SilentAsync(Box::new(f)));
        self.enqueue(node.clone());
        AsyncTask::new(node)
    }

    pub(crate) fn spawn_dependent_async(
        self: &Arc<Self>,
        f: impl FnMut() + Send + 'static,
        deps: &[AsyncTask],
    ) -> AsyncTask {
        let node = Node::new(Payload::DependentAsync(Box::new(f)));
        node.set_pending_async_deps(deps.len());
        let mut already_satisfied = 0;
        for dep in deps {
            if dep.node().register_waiter_or_already_done(node.clone()) {
                already_satisfied += 1;
            }
        }
        let mut ready_now = deps.is_empty();
        for _ in 0..already_satisfied {
            if node.decrement_pending_async_deps() {
                ready_now = true;
            }
        }
        if ready_now {
            self.enqueue(node.clone());
        }
        AsyncTask::new(node)
    }

    /// Services ready tasks (stolen from any worker) until `ready` reports
    /// true. Shared by `corun_blocking` and `Subflow::join` so both honor
    /// the "does not block the worker" suspension-point guarantee.
    pub(crate) fn drive_until(self: &Arc<Self>, ready: impl FnMut() -> bool) {
        worker::corun_drive(self, ready);
    }

    pub(crate) fn wait_for_all(&self) {
        loop {
            let token = self.drain_notifier.prepare_wait();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                self.drain_notifier.cancel_wait(token);
                return;
            }
            self.drain_notifier.commit_wait(token);
        }
    }
}

/// The fixed worker-thread pool.
pub struct Executor {
    inner: Arc<ExecutorInner>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Executor {
    pub fn new(num_workers: usize, interface: Option<Arc<dyn WorkerInterface>>) -> Self {
        assert!(num_workers > 0, "Executor requires at least one worker");
        let inner = ExecutorInner::new(num_workers, interface);
        let shutdown = Arc::new(AtomicBool::new(false));
        let threads = (0..num_workers)
            .map(|index| {
                let inner = inner.clone();
                let shutdown = shutdown.clone();
                std::thread::Builder::new()
                    .name(format!("taskloom-worker-{index}"))
                    .spawn(move || worker::run_loop(inner, index, shutdown))
                    .expect("failed to spawn taskloom worker thread")
            })
            .collect();
        info!(num_workers, "taskloom executor started");
        Self {
            inner,
            shutdown,
            threads,
        }
    }

    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn num_workers(&self) -> usize {
        self.inner.num_workers()
    }

    pub fn run(&self, graph: Arc<Graph>) -> Future<RunOutcome> {
        self.inner.submit(graph, Box::new(|| true), None)
    }

    pub fn run_n(&self, graph: Arc<Graph>, n: usize) -> Future<RunOutcome> {
        if n == 0 {
            let (promise, future) = future::channel();
            promise.resolve(RunOutcome::default());
            return future;
        }
        let completed = AtomicUsize::new(0);
        let predicate = move || completed.fetch_add(1, Ordering::AcqRel) + 1 >= n;
        self.inner.submit(graph, Box::new(predicate), None)
    }

    pub fn run_until(
        &self,
        graph: Arc<Graph>,
        predicate: impl FnMut() -> bool + Send + 'static,
    ) -> Future<RunOutcome> {
        self.run_until_with(graph, predicate, None)
    }

    pub fn run_until_with(
        &self,
        graph: Arc<Graph>,
        predicate: impl FnMut() -> bool + Send + 'static,
        completion_cb: Option<Box<dyn FnOnce() + Send>>,
    ) -> Future<RunOutcome> {
        self.inner.submit(graph, Box::new(predicate), completion_cb)
    }

    /// Runs `graph` repeatedly while `condition` returns `true`.
    pub fn run_while(
        &self,
        graph: Arc<Graph>,
        mut condition: impl FnMut() -> bool + Send + 'static,
    ) -> Future<RunOutcome> {
        let predicate = move || !condition();
        self.inner.submit(graph, Box::new(predicate), None)
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

    pub fn silent_dependent_async(
        &self,
        f: impl FnMut() + Send + 'static,
        deps: &[AsyncTask],
    ) -> AsyncTask {
        self.inner.spawn_dependent_async(f, deps)
    }

    pub fn dependent_async<R>(
        &self,
        mut f: impl FnMut() -> R + Send + 'static,
        deps: &[AsyncTask],
    ) -> (AsyncTask, Future<R>)
    where
        R: Send + 'static,
    {
        let (promise, future) = future::channel::<R>();
        let promise_slot = Mutex::new(Some(promise));
        let task = self.inner.spawn_dependent_async(
            move || {
                let value = f();
                if let Some(p) = promise_slot.lock().unwrap().take() {
                    p.resolve(value);
                }
            },
            deps,
        );
        (task, future)
    }

    pub fn corun(&self, graph: Arc<Graph>) -> Result<(), TaskloomError> {
        self.inner.corun_blocking(graph)
    }

    pub fn wait_for_all(&self) {
        self.inner.wait_for_all();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.inner.notifier.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
