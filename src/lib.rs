//! `taskloom`: an in-process parallel task-graph execution engine.
//!
//! Build a [`task::Graph`] of [`task::Task`]s with `precede`/`succeed`
//! dependencies, hand it to an [`executor::Executor`], and it runs on a
//! fixed pool of work-stealing worker threads honoring dependencies,
//! priorities, and semaphore constraints. Completion is reported through a
//! [`executor::Future`].
//!
//! The [`pipeline`] module layers a staged SERIAL/PARALLEL token-scheduling
//! state machine on top of the same graph core; a [`pipeline::Pipeline`]
//! composes into a `Graph` just like any other module task.

pub mod async_task;
pub mod error;
pub mod executor;
pub mod pipeline;
mod retry;
pub mod runtime;
mod sync;
pub mod task;

pub use async_task::AsyncTask;
pub use error::{Result, TaskloomError};
pub use executor::{Executor, ExecutorBuilder, Future, WorkerInterface};
pub use pipeline::{Pipe, PipeType, Pipeflow, Pipeline, ScalablePipeline};
pub use runtime::{Runtime, Subflow};
pub use task::{Graph, Node, RunOutcome, Semaphore, Task, TaskPriority};
