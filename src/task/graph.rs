//! `Graph`: an owned, ordered collection of `Node`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::sync::{Entry, EntryList};

use super::node::{Node, Payload};
use super::priority::TaskPriority;
use super::semaphore::Semaphore;

/// A lightweight, cloneable handle to a `Node` owned by a `Graph`.
///
/// The heavy state lives on `Node`; `Task` is just a typed reference plus
/// the bookkeeping needed to remove the node from its owning `Graph`.
#[derive(Clone)]
pub struct Task {
    pub(crate) node: Arc<Node>,
    pub(crate) entry: Option<Entry>,
}

impl Task {
    pub fn precede(&self, others: &[Task]) -> &Task {
        for other in others {
            self.node.add_edge(&other.node);
        }
        self
    }

    pub fn succeed(&self, befores: &[Task]) -> &Task {
        for before in befores {
            before.node.add_edge(&self.node);
        }
        self
    }

    pub fn name(&self, name: impl Into<String>) -> &Task {
        self.node.set_name(name);
        self
    }

    pub fn get_name(&self) -> Option<String> {
        self.node.name()
    }

    pub fn priority(&self, level: TaskPriority) -> &Task {
        self.node.set_priority(level);
        self
    }

    pub fn get_priority(&self) -> TaskPriority {
        self.node.priority()
    }

    pub fn acquire(&self, sem: &Arc<Semaphore>) -> &Task {
        self.node.add_semaphore(sem.clone());
        self
    }

    /// Mirrors `acquire` for symmetry; the engine releases every acquired
    /// semaphore automatically after the payload returns, so this method
    /// exists only to let callers assert intent/document it — it is a no-op
    /// beyond returning `self` since `acquire` already fully determines the
    /// acquire/release set.
    pub fn release(&self, _sem: &Arc<Semaphore>) -> &Task {
        self
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }
}

/// An ordered, owning container of `Node`s.
///
/// Structural edits (`emplace`, `precede`/`succeed`, `remove`, `clear`) are
/// only valid while the graph is not running, enforced by `running`.
pub struct Graph {
    nodes: Mutex<EntryList<Arc<Node>>>,
    running: AtomicBool,
    /// Held for the duration of a nested (module) invocation so that two
    /// `composed_of` tasks referencing the same `Graph` serialize rather
    /// than racing on shared join counters. See DESIGN.md for the
    /// rationale.
    module_run_lock: Mutex<()>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(EntryList::new()),
            running: AtomicBool::new(false),
            module_run_lock: Mutex::new(()),
        }
    }

    pub fn emplace(&self, f: impl FnMut() + Send + 'static) -> Task {
        self.insert(Node::new(Payload::Static(Box::new(f))))
    }

    pub fn emplace_condition(&self, f: impl FnMut() -> usize + Send + 'static) -> Task {
        self.insert(Node::new(Payload::Condition(Box::new(f))))
    }

    pub fn emplace_multi_condition(
        &self,
        f: impl FnMut() -> Vec<usize> + Send + 'static,
    ) -> Task {
        self.insert(Node::new(Payload::MultiCondition(Box::new(f))))
    }

    pub fn emplace_subflow(
        &self,
        f: impl FnMut(&mut crate::runtime::Subflow) + Send + 'static,
    ) -> Task {
        self.insert(Node::new(Payload::Subflow(Box::new(f))))
    }

    pub fn placeholder(&self) -> Task {
        self.insert(Node::new(Payload::Placeholder))
    }

    pub fn composed_of(&self, subgraph: Arc<Graph>) -> Task {
        self.insert(Node::new(Payload::Module(subgraph)))
    }

    /// Chains `tasks[0].precede(tasks[1])`, `tasks[1].precede(tasks[2])`,
    /// and so on.
    pub fn linearize(&self, tasks: &[Task]) {
        for pair in tasks.windows(2) {
            pair[0].precede(&[pair[1].clone()]);
        }
    }

    fn insert(&self, node: Arc<Node>) -> Task {
        let entry = self.nodes.lock().unwrap().insert(node.clone());
        Task {
            node,
            entry: Some(entry),
        }
    }

    pub fn remove(&self, task: &Task) {
        if let Some(entry) = &task.entry {
            self.nodes.lock().unwrap().vacate(entry);
        }
    }

    pub fn clear(&self) {
        self.nodes.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().unwrap().active_slots()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.lock().unwrap().iter().cloned().collect()
    }

    /// Nodes with no incoming edges at all, strong or conditional: the set
    /// seeded at the start of every round. A node reachable only through a
    /// conditional edge (a condition task's non-default branch target) has
    /// zero *strong* predecessors but is not a source — it must wait to be
    /// selected, never run unconditionally at round start.
    pub fn sources(&self) -> Vec<Arc<Node>> {
        self.nodes()
            .into_iter()
            .filter(|n| n.num_dependents() == 0)
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.nodes()
            .iter()
            .filter(|n| n.successors_snapshot().is_empty())
            .count()
    }

    /// Attempts to mark the graph running; fails with `false` if a
    /// `Topology` is already in flight over it.
    pub(crate) fn try_begin_run(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_run(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn lock_for_module_entry(&self) -> std::sync::MutexGuard<'_, ()> {
        self.module_run_lock.lock().unwrap()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Graph");
        for node in self.nodes() {
            dbg.field(
                node.name().as_deref().unwrap_or("<unnamed>"),
                &node.successors_snapshot().len(),
            );
        }
        dbg.finish()
    }
}
