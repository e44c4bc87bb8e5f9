//! `Pipe`, `PipeType`, and `Pipeflow`: the per-stage callable and the
//! per-invocation context handed to it.

use std::cell::Cell;
use std::sync::Mutex;

/// Whether a pipe stage serializes its tokens or lets them run concurrently.
///
/// A SERIAL pipe processes at most one token at a time and in strictly
/// increasing token order; a PARALLEL pipe places no ordering constraint on
/// the tokens passing through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeType {
    Serial,
    Parallel,
}

/// One processing stage of a [`super::Pipeline`].
///
/// The callable is boxed behind a `Mutex` (not `RefCell`) because distinct
/// tokens invoke distinct pipes concurrently from distinct worker threads;
/// within one pipe, `Pipeline`'s SERIAL/PARALLEL scheduling is what bounds
/// concurrent access, not this lock (a PARALLEL pipe's callable genuinely
/// needs `Send` interior mutability across threads, hence `FnMut` behind a
/// `Mutex` rather than requiring callers hand over a `Fn`).
pub struct Pipe {
    pub(super) kind: PipeType,
    pub(super) callable: Mutex<Box<dyn FnMut(&mut Pipeflow) + Send>>,
}

impl Pipe {
    pub fn new(kind: PipeType, f: impl FnMut(&mut Pipeflow) + Send + 'static) -> Self {
        Self {
            kind,
            callable: Mutex::new(Box::new(f)),
        }
    }

    pub fn kind(&self) -> PipeType {
        self.kind
    }
}

/// The per-invocation context passed to a pipe's callable.
///
/// Exposes the token's sequence number, which line slot is carrying it, and
/// which pipe (stage) is currently running. `stop()` is only meaningful when
/// called from the first pipe; `defer()` is only meaningful from a SERIAL
/// pipe.
pub struct Pipeflow {
    token: usize,
    line: usize,
    pipe: usize,
    stop: Cell<bool>,
    defer_on: Cell<Option<usize>>,
}

impl Pipeflow {
    pub(super) fn new(token: usize, line: usize, pipe: usize) -> Self {
        Self {
            token,
            line,
            pipe,
            stop: Cell::new(false),
            defer_on: Cell::new(None),
        }
    }

    pub fn token(&self) -> usize {
        self.token
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn pipe(&self) -> usize {
        self.pipe
    }

    /// Requests that token injection stop after this one. Only meaningful
    /// when called from the first pipe; a call from any other pipe is
    /// ignored by the scheduler.
    pub fn stop(&self) {
        self.stop.set(true);
    }

    pub(super) fn stop_requested(&self) -> bool {
        self.stop.get()
    }

    /// Defers this token: the scheduler will not advance it past the
    /// current (SERIAL) pipe until `token` has completed the entire
    /// pipeline.
    pub fn defer(&self, token: usize) {
        self.defer_on.set(Some(token));
    }

    pub(super) fn take_defer(&self) -> Option<usize> {
        self.defer_on.take()
    }
}
