//! The token-scheduling state machine shared by `Pipeline` and
//! `ScalablePipeline`.
//!
//! Each `line` is a graph `Node` (one of the `Pipeline`'s internal `Graph`
//! sources) that loops pulling the next unassigned token and walking it
//! through every pipe in order. The first pipe must be SERIAL, since it is
//! what assigns tokens their sequence number.
//!
//! SERIAL ordering is enforced with one cursor per SERIAL pipe: a pipe's
//! callable for token `t` only runs once that pipe's cursor reads `t`: the
//! cursor is then advanced to `t + 1`, letting the next token in. This gives
//! exact ordering and a single token in flight per SERIAL pipe at a time,
//! without needing a lock-free deque per pipe — a worker spins with the
//! same bounded, jittered backoff the executor's idle loop uses
//! (`crate::retry`) rather than busy-waiting unbounded.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::retry::{ExponentialBackoffDecider, IdleMan, IdleState};
use crate::task::Graph;

use super::pipe::{Pipe, Pipeflow, PipeType};

const MAX_WAIT_SPINS: u32 = 32;

fn backoff() -> IdleMan {
    IdleMan::new(
        MAX_WAIT_SPINS,
        ExponentialBackoffDecider::new(2, 0.5, Duration::from_micros(5), Duration::from_millis(2)),
    )
}

/// Tracks each (line, pipe) slot's last-known occupancy for introspection.
/// Informational: the scheduling decisions above are driven by the cursors
/// and token counter, not this table, but it is kept up to date for
/// inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Empty,
    Busy,
    Done,
    Deferred,
}

pub(super) struct PipelineCore {
    num_lines: usize,
    pipes: Mutex<Vec<Arc<Pipe>>>,
    /// One cursor per pipe index; meaningful only for SERIAL pipes, left
    /// unused (and un-waited-on) for PARALLEL ones.
    cursors: Mutex<Vec<usize>>,
    stage_state: Mutex<Vec<Vec<StageState>>>,
    next_token: AtomicUsize,
    stopped: AtomicBool,
    stop_token: AtomicUsize,
    completed_tokens: Mutex<HashSet<usize>>,
    active_lines: AtomicUsize,
    running: AtomicBool,
}

impl PipelineCore {
    pub(super) fn new(num_lines: usize, pipes: Vec<Pipe>) -> Arc<Self> {
        assert!(num_lines > 0, "Pipeline: num_lines must be positive");
        assert!(!pipes.is_empty(), "Pipeline: must have at least one pipe");
        assert_eq!(
            pipes[0].kind(),
            PipeType::Serial,
            "Pipeline: the first pipe must be SERIAL (it assigns token order)"
        );
        let num_pipes = pipes.len();
        Arc::new(Self {
            num_lines,
            pipes: Mutex::new(pipes.into_iter().map(Arc::new).collect()),
            cursors: Mutex::new(vec![0; num_pipes]),
            stage_state: Mutex::new(vec![vec![StageState::Empty; num_pipes]; num_lines]),
            next_token: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            stop_token: AtomicUsize::new(usize::MAX),
            completed_tokens: Mutex::new(HashSet::new()),
            active_lines: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        })
    }

    pub(super) fn num_lines(&self) -> usize {
        self.num_lines
    }

    pub(super) fn num_pipes(&self) -> usize {
        self.pipes.lock().unwrap().len()
    }

    pub(super) fn stop_token(&self) -> Option<usize> {
        self.stopped
            .load(Ordering::Acquire)
            .then(|| self.stop_token.load(Ordering::Acquire))
    }

    pub(super) fn stage_state(&self, line: usize, pipe: usize) -> StageState {
        self.stage_state.lock().unwrap()[line][pipe]
    }

    /// Swaps in a new pipe sequence. Only valid between runs, mirroring
    /// `Graph`'s own structural-edit-while-running restriction.
    pub(super) fn swap_pipes(&self, pipes: Vec<Pipe>) {
        debug_assert!(
            !self.running.load(Ordering::Acquire),
            "ScalablePipeline::reset called while the pipeline is running"
        );
        assert!(!pipes.is_empty(), "Pipeline: must have at least one pipe");
        assert_eq!(
            pipes[0].kind(),
            PipeType::Serial,
            "Pipeline: the first pipe must be SERIAL (it assigns token order)"
        );
        let num_pipes = pipes.len();
        *self.pipes.lock().unwrap() = pipes.into_iter().map(Arc::new).collect();
        *self.cursors.lock().unwrap() = vec![0; num_pipes];
        *self.stage_state.lock().unwrap() = vec![vec![StageState::Empty; num_pipes]; self.num_lines];
    }

    /// Resets per-run counters. Run by a dedicated reset `Node` that
    /// strong-precedes every line driver, so it always completes before
    /// any line reads `next_token`/`cursors` for the new run.
    fn begin_run(&self) {
        self.next_token.store(0, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        self.stop_token.store(usize::MAX, Ordering::SeqCst);
        self.completed_tokens.lock().unwrap().clear();
        let num_pipes = self.pipes.lock().unwrap().len();
        *self.cursors.lock().unwrap() = vec![0; num_pipes];
        *self.stage_state.lock().unwrap() = vec![vec![StageState::Empty; num_pipes]; self.num_lines];
        self.active_lines.store(self.num_lines, Ordering::SeqCst);
        self.running.store(true, Ordering::Release);
    }

    fn line_finished(&self) {
        if self.active_lines.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.running.store(false, Ordering::Release);
        }
    }

    /// Waits until `pipe_index`'s cursor reads `token`.
    fn wait_turn(&self, pipe_index: usize, token: usize) {
        let mut idle = backoff();
        loop {
            if *self.cursors.lock().unwrap().get(pipe_index).unwrap() == token {
                return;
            }
            spin(&mut idle);
        }
    }

    /// Same as `wait_turn`, but also bails out (returning `false`) if the
    /// pipeline has stopped at a token at or before this one — used only
    /// for pipe 0, the sole place a token can be born past the stop
    /// boundary.
    fn wait_turn_or_abandon(&self, token: usize) -> bool {
        let mut idle = backoff();
        loop {
            if self.stopped.load(Ordering::Acquire) && token > self.stop_token.load(Ordering::Acquire) {
                let mut cursors = self.cursors.lock().unwrap();
                if cursors[0] == token {
                    cursors[0] = token + 1;
                }
                return false;
            }
            if self.cursors.lock().unwrap()[0] == token {
                return true;
            }
            spin(&mut idle);
        }
    }

    fn advance_cursor(&self, pipe_index: usize, token: usize) {
        self.cursors.lock().unwrap()[pipe_index] = token + 1;
    }

    fn wait_for_completion(&self, token: usize) {
        let mut idle = backoff();
        while !self.completed_tokens.lock().unwrap().contains(&token) {
            spin(&mut idle);
        }
    }

    fn mark_completed(&self, token: usize) {
        self.completed_tokens.lock().unwrap().insert(token);
    }

    fn set_stage(&self, line: usize, pipe: usize, state: StageState) {
        self.stage_state.lock().unwrap()[line][pipe] = state;
    }
}

/// Backs off one step; once the bounded spin count is exhausted, yields the
/// thread and restarts the backoff rather than parking (there is no
/// condition variable tied to a SERIAL pipe's cursor advancing, unlike the
/// executor's own `NotifierBus` park).
fn spin(idle: &mut IdleMan) {
    match idle.next_idle() {
        IdleState::Ongoing(Some(state)) => {
            if let Some(wait) = state.wait {
                std::thread::sleep(wait);
            }
        }
        IdleState::Ongoing(None) => {}
        IdleState::Expired => {
            idle.reset();
            std::thread::yield_now();
        }
    }
}

fn invoke(pipe: &Pipe, pf: &mut Pipeflow) {
    (pipe.callable.lock().unwrap())(pf);
}

/// One pipe stage's worth of work for a single token on a single line.
/// Returns `true` if `stop()` was called (only meaningful for pipe 0).
fn run_stage(core: &PipelineCore, pipe: &Pipe, pipe_index: usize, token: usize, line: usize) -> bool {
    core.set_stage(line, pipe_index, StageState::Busy);
    let mut pf = Pipeflow::new(token, line, pipe_index);
    invoke(pipe, &mut pf);

    if let Some(dep) = pf.take_defer() {
        core.set_stage(line, pipe_index, StageState::Deferred);
        core.wait_for_completion(dep);
    }

    if pipe.kind() == PipeType::Serial {
        core.advance_cursor(pipe_index, token);
    }
    core.set_stage(line, pipe_index, StageState::Done);
    pf.stop_requested()
}

/// The body of a single line-driver `Node`: pulls tokens until the
/// pipeline stops, walking each one through every pipe in order.
pub(super) fn run_line(core: Arc<PipelineCore>, line: usize) {
    loop {
        if core.stopped.load(Ordering::Acquire) {
            break;
        }
        let token = core.next_token.fetch_add(1, Ordering::AcqRel);

        if !core.wait_turn_or_abandon(token) {
            break;
        }

        let pipes = core.pipes.lock().unwrap().clone();
        let stopped_here = run_stage(&core, &pipes[0], 0, token, line);
        if stopped_here {
            if core
                .stopped
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                core.stop_token.store(token, Ordering::Release);
            }
            break;
        }

        for (pipe_index, pipe) in pipes.iter().enumerate().skip(1) {
            if pipe.kind() == PipeType::Serial {
                core.wait_turn(pipe_index, token);
            }
            run_stage(&core, pipe, pipe_index, token, line);
        }

        core.mark_completed(token);
    }
    core.line_finished();
}

/// Builds the internal `Graph`: a reset source strong-preceding one task
/// per line, so every (re-)entry into the pipeline's `composed_of` module
/// starts the token count fresh from zero.
pub(super) fn build_graph(core: Arc<PipelineCore>, num_lines: usize) -> Arc<Graph> {
    let graph = Arc::new(Graph::new());
    let reset_core = core.clone();
    let reset_task = graph.emplace(move || reset_core.begin_run());
    reset_task.name("pipeline-reset");

    for line in 0..num_lines {
        let line_core = core.clone();
        let task = graph.emplace(move || run_line(line_core.clone(), line));
        task.name(format!("pipeline-line-{line}"));
        reset_task.precede(&[task]);
    }

    graph
}
