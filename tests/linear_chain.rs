//! S1: a strict linear chain runs its nodes in precedence order exactly
//! once each, even on a multi-worker executor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskloom::{Executor, Graph};

#[test]
fn linear_chain_runs_in_precedence_order() {
    let executor = Executor::builder().num_workers(4).build();
    let graph = Arc::new(Graph::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    let run_counts = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for name in ["A", "B", "C", "D", "E"] {
        let order = order.clone();
        let run_counts = run_counts.clone();
        let task = graph.emplace(move || {
            order.lock().unwrap().push(name);
            run_counts.lock().unwrap().push(name);
        });
        task.name(name);
        tasks.push(task);
    }
    graph.linearize(&tasks);

    let outcome = executor.run(graph).get().unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C", "D", "E"]);

    let counts = run_counts.lock().unwrap();
    for name in ["A", "B", "C", "D", "E"] {
        assert_eq!(counts.iter().filter(|&&n| n == name).count(), 1);
    }
}

#[test]
fn diamond_join_runs_each_node_exactly_once() {
    let executor = Executor::builder().num_workers(4).build();
    let graph = Arc::new(Graph::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let make = |counter: Arc<AtomicUsize>| graph.emplace(move || { counter.fetch_add(1, Ordering::SeqCst); });
    let a = make(counter.clone());
    let b = make(counter.clone());
    let c = make(counter.clone());
    let d = make(counter.clone());

    a.precede(&[b.clone(), c.clone()]);
    b.precede(&[d.clone()]);
    c.precede(&[d.clone()]);

    executor.run(graph).get().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 4);
}
