//! S5: on a single-worker executor, ready tasks run in priority order
//! (HIGH before NORMAL before LOW) among siblings that became ready at the
//! same time.

use std::sync::{Arc, Mutex};

use taskloom::{Executor, Graph, TaskPriority};

#[test]
fn priority_ordering_on_single_worker() {
    let executor = Executor::builder().num_workers(1).build();
    let graph = Arc::new(Graph::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let a = graph.emplace(|| {});

    let make = |name: &'static str| {
        let order = order.clone();
        graph.emplace(move || order.lock().unwrap().push(name))
    };
    let b = make("B");
    let c = make("C");
    let d = make("D");
    b.priority(TaskPriority::High);
    c.priority(TaskPriority::Low);
    d.priority(TaskPriority::Normal);

    let e = graph.emplace(|| {});

    a.precede(&[b.clone(), c.clone(), d.clone()]);
    b.precede(&[e.clone()]);
    c.precede(&[e.clone()]);
    d.precede(&[e.clone()]);

    executor.run(graph).get().unwrap();

    let order = order.lock().unwrap();
    let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();
    assert!(pos("B") < pos("D"), "HIGH must run before NORMAL: {order:?}");
    assert!(pos("D") < pos("C"), "NORMAL must run before LOW: {order:?}");
}
