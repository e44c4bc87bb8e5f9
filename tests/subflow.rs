//! `Subflow`: a task can spawn dynamic children at runtime and block on
//! them with `join()` before returning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskloom::{Executor, Graph};

#[test]
fn subflow_children_complete_before_join_returns() {
    let executor = Executor::builder().num_workers(4).build();
    let graph = Arc::new(Graph::new());
    let child_count = Arc::new(AtomicUsize::new(0));
    let observed_at_join = Arc::new(AtomicUsize::new(0));

    let cc = child_count.clone();
    let oc = observed_at_join.clone();
    graph.emplace_subflow(move |sf| {
        for _ in 0..4 {
            let cc = cc.clone();
            sf.emplace(move || { cc.fetch_add(1, Ordering::SeqCst); });
        }
        sf.join();
        oc.store(cc.load(Ordering::SeqCst), Ordering::SeqCst);
    });

    executor.run(graph).get().unwrap();

    assert_eq!(child_count.load(Ordering::SeqCst), 4);
    assert_eq!(observed_at_join.load(Ordering::SeqCst), 4);
}

#[test]
fn subflow_join_does_not_deadlock_a_single_worker() {
    // A single-worker pool has nowhere else to run the subflow's children
    // except the same worker that is blocked in `join()`; this only makes
    // progress because `join()` drives the scheduling loop instead of
    // parking on a future.
    let executor = Executor::builder().num_workers(1).build();
    let graph = Arc::new(Graph::new());
    let child_count = Arc::new(AtomicUsize::new(0));

    let cc = child_count.clone();
    graph.emplace_subflow(move |sf| {
        for _ in 0..8 {
            let cc = cc.clone();
            sf.emplace(move || { cc.fetch_add(1, Ordering::SeqCst); });
        }
        sf.join();
    });

    executor.run(graph).get().unwrap();
    assert_eq!(child_count.load(Ordering::SeqCst), 8);
}

#[test]
fn detached_subflow_children_run_independently() {
    let executor = Executor::builder().num_workers(4).build();
    let graph = Arc::new(Graph::new());
    let child_ran = Arc::new(AtomicUsize::new(0));

    let cc = child_ran.clone();
    graph.emplace_subflow(move |sf| {
        let cc = cc.clone();
        sf.emplace(move || { cc.fetch_add(1, Ordering::SeqCst); });
        sf.detached();
    });

    executor.run(graph).get().unwrap();
    executor.wait_for_all();

    assert_eq!(child_ran.load(Ordering::SeqCst), 1);
}
