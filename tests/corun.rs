//! `Executor::corun`/`Runtime::corun`: block the calling thread on a nested
//! graph while servicing other ready work instead of parking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskloom::{Executor, Graph, Runtime};

#[test]
fn corun_runs_the_given_graph_to_completion() {
    let executor = Executor::builder().num_workers(2).build();
    let graph = Arc::new(Graph::new());
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let counter = counter.clone();
        graph.emplace(move || { counter.fetch_add(1, Ordering::SeqCst); });
    }

    executor.corun(graph).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[test]
fn runtime_corun_from_within_a_task_does_not_deadlock_a_single_worker() {
    // The one pool worker is the thread executing `outer`'s payload, which
    // calls `Runtime::corun` on `nested` — there is no second worker to run
    // `nested`'s tasks. This only completes because `corun` drives the
    // scheduling loop (servicing `nested`'s own tasks, stolen right back off
    // the same worker's queue) instead of parking on a future.
    let executor = Executor::builder().num_workers(1).build();

    let outer = Arc::new(Graph::new());
    let nested_ran = Arc::new(AtomicUsize::new(0));

    let nr = nested_ran.clone();
    outer.emplace(move || {
        let nested = Arc::new(Graph::new());
        for _ in 0..6 {
            let nr = nr.clone();
            nested.emplace(move || { nr.fetch_add(1, Ordering::SeqCst); });
        }
        Runtime::current().corun(nested).unwrap();
    });

    executor.run(outer).get().unwrap();
    assert_eq!(nested_ran.load(Ordering::SeqCst), 6);
}

#[test]
fn corun_interleaves_with_other_outstanding_work() {
    let executor = Executor::builder().num_workers(2).build();

    let background = Arc::new(Graph::new());
    let background_ran = Arc::new(AtomicUsize::new(0));
    let br = background_ran.clone();
    background.emplace(move || { br.fetch_add(1, Ordering::SeqCst); });
    let background_future = executor.run(background);

    let nested = Arc::new(Graph::new());
    let nested_ran = Arc::new(AtomicUsize::new(0));
    let nr = nested_ran.clone();
    nested.emplace(move || { nr.fetch_add(1, Ordering::SeqCst); });

    executor.corun(nested).unwrap();
    assert_eq!(nested_ran.load(Ordering::SeqCst), 1);

    background_future.get().unwrap();
    assert_eq!(background_ran.load(Ordering::SeqCst), 1);
}
