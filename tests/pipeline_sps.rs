//! S3: a three-stage SERIAL/PARALLEL/SERIAL pipeline over four lines,
//! stopped from the first pipe at a fixed token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskloom::{Executor, Graph, Pipe, PipeType, Pipeline, ScalablePipeline};

#[test]
fn pipeline_sps_matches_expected_invocation_counts() {
    let executor = Executor::builder().num_workers(4).build();

    let pipe0_calls = Arc::new(AtomicUsize::new(0));
    let pipe1_calls = Arc::new(AtomicUsize::new(0));
    let pipe2_calls = Arc::new(AtomicUsize::new(0));
    let buffer: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(vec![0; 4]));

    let pipe0 = {
        let calls = pipe0_calls.clone();
        let buffer = buffer.clone();
        Pipe::new(PipeType::Serial, move |pf| {
            calls.fetch_add(1, Ordering::SeqCst);
            if pf.token() == 5 {
                pf.stop();
            } else {
                buffer.lock().unwrap()[pf.line()] = pf.token();
            }
        })
    };
    let pipe1 = {
        let calls = pipe1_calls.clone();
        let buffer = buffer.clone();
        Pipe::new(PipeType::Parallel, move |pf| {
            calls.fetch_add(1, Ordering::SeqCst);
            buffer.lock().unwrap()[pf.line()] += 1;
        })
    };
    let pipe2 = {
        let calls = pipe2_calls.clone();
        let buffer = buffer.clone();
        Pipe::new(PipeType::Serial, move |pf| {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut guard = buffer.lock().unwrap();
            // pipe0 seeded buffer[line] = token, pipe1 added 1: buffer[line]
            // is token + 1 on entry; pipe2 adds the second 1.
            assert_eq!(guard[pf.line()], pf.token() + 1);
            guard[pf.line()] += 1;
        })
    };

    let pipeline = Pipeline::new(4, vec![pipe0, pipe1, pipe2]);
    let graph = Arc::new(Graph::new());
    graph.composed_of(pipeline.graph());

    executor.run(graph).get().unwrap();

    assert_eq!(pipe0_calls.load(Ordering::SeqCst), 6);
    assert_eq!(pipe1_calls.load(Ordering::SeqCst), 5);
    assert_eq!(pipe2_calls.load(Ordering::SeqCst), 5);
    assert_eq!(pipeline.stop_token(), Some(5));
}

#[test]
fn scalable_pipeline_reset_restarts_token_count_from_zero() {
    let executor = Executor::builder().num_workers(4).build();
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let make_pipe = |seen: Arc<Mutex<Vec<usize>>>| {
        Pipe::new(PipeType::Serial, move |pf| {
            if pf.token() == 3 {
                pf.stop();
            } else {
                seen.lock().unwrap().push(pf.token());
            }
        })
    };

    let pipeline = ScalablePipeline::new(2, vec![make_pipe(seen.clone())]);
    let graph = Arc::new(Graph::new());
    graph.composed_of(pipeline.graph());

    executor.run(graph.clone()).get().unwrap();
    let mut first_run = seen.lock().unwrap().clone();
    first_run.sort_unstable();
    assert_eq!(first_run, vec![0, 1, 2]);

    seen.lock().unwrap().clear();
    pipeline.reset(vec![make_pipe(seen.clone())]);

    executor.run(graph).get().unwrap();
    let mut second_run = seen.lock().unwrap().clone();
    second_run.sort_unstable();
    assert_eq!(second_run, vec![0, 1, 2]);
}
