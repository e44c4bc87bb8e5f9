//! Cancelling a run's `Future` is observable on the resolved `RunOutcome`
//! without disturbing an already-obtained result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskloom::{Executor, Graph};

#[test]
fn cancel_is_reflected_in_run_outcome() {
    let executor = Executor::builder().num_workers(2).build();
    let graph = Arc::new(Graph::new());
    let ran = Arc::new(AtomicUsize::new(0));

    let a = graph.emplace({
        let ran = ran.clone();
        move || { ran.fetch_add(1, Ordering::SeqCst); }
    });
    let b = graph.emplace({
        let ran = ran.clone();
        move || { ran.fetch_add(1, Ordering::SeqCst); }
    });
    a.precede(&[b.clone()]);

    let future = executor.run(graph);
    future.cancel();
    assert!(future.is_cancelled());

    let outcome = future.get().unwrap();
    assert!(outcome.cancelled);
}

#[test]
fn run_n_multiplies_execution_count() {
    let executor = Executor::builder().num_workers(2).build();
    let graph = Arc::new(Graph::new());
    let runs = Arc::new(AtomicUsize::new(0));

    {
        let runs = runs.clone();
        graph.emplace(move || { runs.fetch_add(1, Ordering::SeqCst); });
    }

    executor.run_n(graph, 4).get().unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 4);
}
