//! The pipeline scheduler: `Pipeline` and `ScalablePipeline`, staged
//! SERIAL/PARALLEL token scheduling composed on top of the task graph core.
//!
//! A `Pipeline` builds an internal `Graph` of one line-driver task per
//! concurrent line; `Graph::composed_of` enters it as a nested topology
//! exactly like any other module task, so a pipeline composes into a larger
//! graph as a single unit.

mod core;
mod pipe;
mod scalable;

pub use core::StageState;
pub use pipe::{Pipe, PipeType, Pipeflow};
pub use scalable::ScalablePipeline;

use std::sync::Arc;

use crate::task::Graph;

use self::core::PipelineCore;

/// A fixed-shape pipeline: `num_lines` concurrent token slots flowing
/// through a fixed sequence of SERIAL/PARALLEL pipes.
pub struct Pipeline {
    core: Arc<PipelineCore>,
    graph: Arc<Graph>,
}

impl Pipeline {
    /// Builds a pipeline with `num_lines` concurrent lines and the given
    /// pipe sequence. The first pipe must be SERIAL, since it is what
    /// assigns each token its sequence number.
    pub fn new(num_lines: usize, pipes: Vec<Pipe>) -> Self {
        let core = PipelineCore::new(num_lines, pipes);
        let graph = core::build_graph(core.clone(), num_lines);
        Self { core, graph }
    }

    /// The internal `Graph` to hand to `Graph::composed_of`.
    pub fn graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    pub fn num_lines(&self) -> usize {
        self.core.num_lines()
    }

    pub fn num_pipes(&self) -> usize {
        self.core.num_pipes()
    }

    /// The token number `stop()` was called at during the last run, if any.
    pub fn stop_token(&self) -> Option<usize> {
        self.core.stop_token()
    }

    pub fn stage_state(&self, line: usize, pipe: usize) -> StageState {
        self.core.stage_state(line, pipe)
    }
}
