//! S6: `dependent_async` tasks only become runnable once every dependency
//! they named has completed, at any scale.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskloom::Executor;

#[test]
fn dependent_async_runs_after_its_dependency() {
    let executor = Executor::builder().num_workers(4).build();
    let order = Arc::new(Mutex::new(Vec::new()));

    let order_a = order.clone();
    let a = executor.silent_dependent_async(move || order_a.lock().unwrap().push("A"), &[]);
    let order_b = order.clone();
    let _b = executor.silent_dependent_async(move || order_b.lock().unwrap().push("B"), &[a]);

    executor.wait_for_all();

    assert_eq!(*order.lock().unwrap(), vec!["A", "B"]);
}

#[test]
fn dependent_async_waits_on_all_named_dependencies() {
    let executor = Executor::builder().num_workers(4).build();
    let done = Arc::new(Mutex::new(Vec::new()));

    let mut deps = Vec::new();
    for name in ["A", "B", "C"] {
        let done = done.clone();
        deps.push(executor.silent_dependent_async(move || done.lock().unwrap().push(name), &[]));
    }
    let done_final = done.clone();
    executor.silent_dependent_async(move || done_final.lock().unwrap().push("final"), &deps);

    executor.wait_for_all();

    let done = done.lock().unwrap();
    let final_pos = done.iter().position(|&n| n == "final").unwrap();
    assert_eq!(final_pos, 3, "final must run only after all three deps");
}

#[test]
fn many_dependent_async_chains_all_complete() {
    let executor = Executor::builder().num_workers(8).build();
    let completed = Arc::new(AtomicUsize::new(0));

    const CHAINS: usize = 10_000;
    for _ in 0..CHAINS {
        let completed_a = completed.clone();
        let a = executor.silent_dependent_async(move || { completed_a.fetch_add(1, Ordering::SeqCst); }, &[]);
        let completed_b = completed.clone();
        executor.silent_dependent_async(move || { completed_b.fetch_add(1, Ordering::SeqCst); }, &[a]);
    }

    executor.wait_for_all();

    assert_eq!(completed.load(Ordering::SeqCst), CHAINS * 2);
}

#[test]
fn async_task_future_resolves_with_payload_result() {
    let executor = Executor::builder().num_workers(2).build();
    let (_task, future) = executor.async_task(|| 7 * 6);
    assert_eq!(future.get().unwrap(), 42);
}
