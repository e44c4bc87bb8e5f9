//! `Topology`: one running instance of a `Graph`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::TaskloomError;
use crate::executor::future::Promise;

use super::graph::Graph;
use super::node::Node;

/// Outcome of a completed topology run, delivered through its `Future`.
#[derive(Debug, Default, Clone)]
pub struct RunOutcome {
    pub cancelled: bool,
}

/// A single in-flight execution of a `Graph`.
///
/// Owns the run-scoped join counter, the re-run predicate, the completion
/// callback, and the cancellation flag. Created by the `Executor` when a
/// graph is submitted; destroyed after the completion callback returns and
/// the paired promise is resolved.
pub struct Topology {
    pub(crate) graph: Arc<Graph>,
    /// Number of nodes in this run not yet completed. Includes nodes added
    /// dynamically by subflows/runtime-spawned async children.
    pub(crate) join_counter: AtomicUsize,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) predicate: Mutex<Box<dyn FnMut() -> bool + Send>>,
    pub(crate) completion_cb: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    /// The promise handed back to the submitter by `Executor::run`/`run_n`/
    /// etc.; resolved once the predicate reports the run as done.
    pub(crate) result_promise: Mutex<Option<Promise<RunOutcome>>>,
    /// First captured payload panic for this run; subsequent ones are
    /// dropped — first failure wins.
    pub(crate) failure: Mutex<Option<TaskloomError>>,
    /// True for the lifetime of the *first* dispatch pass only; used to
    /// decide whether sources should be seeded fresh or a re-run is under
    /// way (both paths call `reset_round`, this just aids diagnostics).
    pub(crate) round: AtomicUsize,
}

impl Topology {
    pub fn new(
        graph: Arc<Graph>,
        predicate: Box<dyn FnMut() -> bool + Send>,
        completion_cb: Option<Box<dyn FnOnce() + Send>>,
        result_promise: Promise<RunOutcome>,
        cancelled: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            graph,
            join_counter: AtomicUsize::new(0),
            cancelled,
            predicate: Mutex::new(predicate),
            completion_cb: Mutex::new(completion_cb),
            result_promise: Mutex::new(Some(result_promise)),
            failure: Mutex::new(None),
            round: AtomicUsize::new(0),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resets every node's join counter to its strong-predecessor baseline,
    /// points each node back at this topology, and re-seeds this
    /// topology's own join counter to the source count, in preparation for
    /// a (re-)run. Returns the sources to enqueue: the join counter only
    /// ever accounts for nodes that are actually in flight, so it must
    /// start at the count of nodes seeded now, not the graph's total node
    /// count (which would also include nodes only reachable later through
    /// a conditional edge).
    pub(crate) fn reset_round(self: &Arc<Self>) -> Vec<Arc<Node>> {
        let nodes = self.graph.nodes();
        for node in &nodes {
            node.reset_for_run();
            *node.topology.lock().unwrap() = Arc::downgrade(self);
        }
        let sources = self.graph.sources();
        self.join_counter.store(sources.len(), Ordering::SeqCst);
        self.round.fetch_add(1, Ordering::AcqRel);
        sources
    }

    /// Accounts for a node entering this round in flight: a subflow child,
    /// a runtime-spawned async child, or a graph successor becoming ready
    /// and enqueued during propagation (including a conditional edge
    /// re-firing a node that already ran earlier this round). The join
    /// counter tracks the number of nodes currently in flight, not a
    /// static node count, since a cyclic condition edge can put the same
    /// node in flight more than once per round.
    pub(crate) fn account_extra_node(&self) {
        self.join_counter.fetch_add(1, Ordering::AcqRel);
    }

    /// Called once per node completion. Returns `true` if this was the
    /// last outstanding node for the current round.
    pub(crate) fn node_completed(&self) -> bool {
        self.join_counter.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Evaluates the re-run predicate. `true` means the topology is done.
    pub(crate) fn predicate_done(&self) -> bool {
        (self.predicate.lock().unwrap())()
    }

    pub(crate) fn run_completion_callback(&self) {
        if let Some(cb) = self.completion_cb.lock().unwrap().take() {
            cb();
        }
    }

    /// Records a payload failure, first-wins.
    pub(crate) fn record_failure(&self, err: TaskloomError) {
        let mut slot = self.failure.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub(crate) fn take_result_promise(&self) -> Option<Promise<RunOutcome>> {
        self.result_promise.lock().unwrap().take()
    }

    pub(crate) fn take_failure(&self) -> Option<TaskloomError> {
        self.failure.lock().unwrap().take()
    }
}
