//! `AsyncTask`: a shared-ownership handle identifying a free async `Node`.
//!
//! Destruction of the last handle does not force early collection if the
//! executor still needs the node (the dependent-async registry keeps its
//! own `Arc` via `Node::async_waiters`), and equality/hashing are
//! identity-based, same as `Node` itself.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::task::Node;

/// A cloneable, identity-comparable reference to an async task submitted
/// through `Executor::silent_async`/`dependent_async` and usable as a
/// dependency for further `dependent_async` calls.
#[derive(Clone)]
pub struct AsyncTask {
    node: Arc<Node>,
}

impl AsyncTask {
    pub(crate) fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Whether the underlying task has finished running.
    pub fn is_done(&self) -> bool {
        self.node.is_done()
    }

    pub fn name(&self) -> Option<String> {
        self.node.name()
    }
}

impl PartialEq for AsyncTask {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}
impl Eq for AsyncTask {}

impl Hash for AsyncTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.node) as usize).hash(state)
    }
}

impl std::fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTask")
            .field("name", &self.name())
            .field("done", &self.is_done())
            .finish()
    }
}
