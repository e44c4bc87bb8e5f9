//! `ScalablePipeline`: a `Pipeline` whose pipe sequence can be swapped
//! between runs without rebuilding the composed `Graph` node.

use std::sync::Arc;

use crate::task::Graph;

use super::core::{self, PipelineCore, StageState};
use super::pipe::Pipe;

pub struct ScalablePipeline {
    core: Arc<PipelineCore>,
    graph: Arc<Graph>,
}

impl ScalablePipeline {
    pub fn new(num_lines: usize, pipes: impl IntoIterator<Item = Pipe>) -> Self {
        let pipeline_core = PipelineCore::new(num_lines, pipes.into_iter().collect());
        let graph = core::build_graph(pipeline_core.clone(), num_lines);
        Self {
            core: pipeline_core,
            graph,
        }
    }

    /// Swaps in a new pipe range without reconstructing the composed graph
    /// node: the next `run` over the owning graph restarts token counting
    /// from zero with the new pipes.
    pub fn reset(&self, pipes: impl IntoIterator<Item = Pipe>) {
        self.core.swap_pipes(pipes.into_iter().collect());
    }

    pub fn graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    pub fn num_lines(&self) -> usize {
        self.core.num_lines()
    }

    pub fn num_pipes(&self) -> usize {
        self.core.num_pipes()
    }

    pub fn stop_token(&self) -> Option<usize> {
        self.core.stop_token()
    }

    pub fn stage_state(&self, line: usize, pipe: usize) -> StageState {
        self.core.stage_state(line, pipe)
    }
}
