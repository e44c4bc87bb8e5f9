//! S2: a condition task re-activates a predecessor cyclically until its
//! predicate selects the exit branch, which then runs exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskloom::{Executor, Graph};

#[test]
fn conditional_loop_runs_until_predicate_then_exits_once() {
    let executor = Executor::builder().num_workers(2).build();
    let graph = Arc::new(Graph::new());
    let x = Arc::new(AtomicUsize::new(0));
    let b_runs = Arc::new(AtomicUsize::new(0));
    let d_runs = Arc::new(AtomicUsize::new(0));

    let a = graph.emplace({
        let x = x.clone();
        move || x.store(0, Ordering::SeqCst)
    });
    let b = graph.emplace({
        let x = x.clone();
        let b_runs = b_runs.clone();
        move || {
            x.fetch_add(1, Ordering::SeqCst);
            b_runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    let d = graph.emplace({
        let d_runs = d_runs.clone();
        move || { d_runs.fetch_add(1, Ordering::SeqCst); }
    });
    let c = graph.emplace_condition({
        let x = x.clone();
        move || if x.load(Ordering::SeqCst) < 5 { 0 } else { 1 }
    });

    a.precede(&[b.clone()]);
    b.precede(&[c.clone()]);
    // successors[0] == b (branch 0, loop back), successors[1] == d (branch 1, exit)
    c.precede(&[b.clone(), d.clone()]);

    let outcome = executor.run(graph).get().unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(x.load(Ordering::SeqCst), 5);
    assert_eq!(b_runs.load(Ordering::SeqCst), 5);
    assert_eq!(d_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn multi_condition_can_activate_several_successors() {
    let executor = Executor::builder().num_workers(2).build();
    let graph = Arc::new(Graph::new());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    let fan_out = graph.emplace_multi_condition(|| vec![0, 2]);
    let make = |name: &'static str| {
        let seen = seen.clone();
        graph.emplace(move || seen.lock().unwrap().push(name))
    };
    let branch0 = make("branch0");
    let branch1 = make("branch1");
    let branch2 = make("branch2");
    fan_out.precede(&[branch0.clone(), branch1.clone(), branch2.clone()]);

    executor.run(graph).get().unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&"branch0"));
    assert!(seen.contains(&"branch2"));
    assert!(!seen.contains(&"branch1"));
}
