//! The task graph data model: `Node`, `Graph`, `Task`, `Semaphore`,
//! `Topology`, and `TaskPriority`.

mod graph;
mod node;
mod priority;
mod semaphore;
mod topology;

pub use graph::{Graph, Task};
pub use node::{Node, Payload};
pub use priority::{TaskPriority, MAX_PRIORITY};
pub use semaphore::Semaphore;
pub use topology::{RunOutcome, Topology};
