//! Semaphore-gated tasks never exceed their configured concurrency, and
//! every task still runs exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskloom::{Executor, Graph, Semaphore};

#[test]
fn semaphore_bounds_concurrent_task_execution() {
    let executor = Executor::builder().num_workers(4).build();
    let graph = Arc::new(Graph::new());
    let sem = Semaphore::new(1);
    let current = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let total_runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..8 {
        let current = current.clone();
        let max_seen = max_seen.clone();
        let total_runs = total_runs.clone();
        let task = graph.emplace(move || {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            current.fetch_sub(1, Ordering::SeqCst);
            total_runs.fetch_add(1, Ordering::SeqCst);
        });
        task.acquire(&sem);
    }

    executor.run(graph).get().unwrap();

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(total_runs.load(Ordering::SeqCst), 8);
}

#[test]
fn semaphore_with_capacity_two_allows_two_but_not_three() {
    let executor = Executor::builder().num_workers(6).build();
    let graph = Arc::new(Graph::new());
    let sem = Semaphore::new(2);
    let current = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    for _ in 0..6 {
        let current = current.clone();
        let max_seen = max_seen.clone();
        let task = graph.emplace(move || {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            current.fetch_sub(1, Ordering::SeqCst);
        });
        task.acquire(&sem);
    }

    executor.run(graph).get().unwrap();

    assert!(max_seen.load(Ordering::SeqCst) <= 2);
}
