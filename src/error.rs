//! Error taxonomy for the engine.
//!
//! One `thiserror` variant per failure mode a caller can observe, kept flat
//! rather than nested so call sites can match on it directly.

use thiserror::Error;

/// The engine's error taxonomy.
///
/// User-payload panics are not represented here: they are captured by
/// `catch_unwind` and delivered through the `Future` they are attached to,
/// per the "first exception wins" rule.
#[derive(Debug, Error)]
pub enum TaskloomError {
    /// A structural-invariant violation: submitting a graph that is already
    /// running, mutating edges mid-run, scheduling a node into the wrong
    /// topology, or a conditional task returning an out-of-range branch
    /// index. In debug builds callers should prefer `debug_assert!` at the
    /// call site; this variant is what a release build reports instead of
    /// aborting.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Raised when allocating a new `Node` (or its owning `Arc`) fails.
    /// Rust's global allocator aborts on OOM by default, so this variant
    /// exists chiefly for forwards-compatibility with fallible-allocation
    /// paths and for use by `Graph::try_emplace`-style APIs.
    #[error("allocation failure while constructing a task graph node")]
    AllocationFailure,

    /// A task payload panicked; the panic payload's message, if it could be
    /// downcast to a string, is preserved here.
    #[error("task payload panicked: {0}")]
    PayloadPanicked(String),

    /// The executor's submission queue is closed (executor shutting down
    /// or shut down) and no further work can be accepted.
    #[error("executor queue is closed")]
    QueueClosed,

    /// A `Graph` was submitted while a prior `Topology` over it is still
    /// running.
    #[error("graph is already running")]
    AlreadyRunning,

    /// A semaphore was released more times than it was acquired.
    #[error("semaphore over-released")]
    SemaphoreOverReleased,
}

pub type Result<T> = std::result::Result<T, TaskloomError>;
