//! `ExecutorBuilder`: configuration surface for an `Executor`.

use std::sync::Arc;

use super::{Executor, WorkerInterface};

const ENV_NUM_WORKERS: &str = "TASKLOOM_NUM_WORKERS";

/// Builds an `Executor` with an explicit worker count, an optional
/// `WorkerInterface`, and observer hooks.
pub struct ExecutorBuilder {
    num_workers: usize,
    interface: Option<Arc<dyn WorkerInterface>>,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self {
            num_workers: default_worker_count(),
            interface: None,
        }
    }

    /// Starts from `TASKLOOM_NUM_WORKERS` if set and parses as a positive
    /// integer, otherwise the hardware thread count.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        if let Ok(value) = std::env::var(ENV_NUM_WORKERS) {
            if let Ok(parsed) = value.parse::<usize>() {
                if parsed > 0 {
                    builder.num_workers = parsed;
                }
            }
        }
        builder
    }

    pub fn num_workers(mut self, count: usize) -> Self {
        assert!(count > 0, "ExecutorBuilder: num_workers must be positive");
        self.num_workers = count;
        self
    }

    pub fn worker_interface(mut self, interface: Arc<dyn WorkerInterface>) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn build(self) -> Executor {
        Executor::new(self.num_workers, self.interface)
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
