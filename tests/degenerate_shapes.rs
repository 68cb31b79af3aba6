//! Degenerate batch shapes: zero length, length shorter than the requested
//! thread count, and a single thread with no peers to steal from.

use stridepool::{DispatchBuilder, Unary};

fn step_of<T>() -> isize {
    std::mem::size_of::<T>() as isize
}

#[test]
fn zero_length_batch_spawns_no_threads_and_writes_nothing() {
    let kernel = Unary::<i32, i32, _>::new(|_| panic!("should never be invoked"));
    let args: [*mut u8; 2] = [std::ptr::null_mut(), std::ptr::null_mut()];
    let steps = [step_of::<i32>(), step_of::<i32>()];

    let dispatcher = DispatchBuilder::new()
        .num_threads(16)
        .build()
        .expect("valid configuration");
    let batch = stridepool::Batch::new(&kernel, &args, &steps, 0, std::ptr::null_mut());
    dispatcher.run(batch);
}

#[test]
fn length_shorter_than_thread_count_clamps_to_one_element_per_thread() {
    let n = 5usize;
    let input: Vec<i32> = (0..n as i32).collect();
    let mut output = vec![0i32; n];
    let kernel = Unary::<i32, i32, _>::new(|x| x + 100);
    let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];
    let steps = [step_of::<i32>(), step_of::<i32>()];

    let dispatcher = DispatchBuilder::new()
        .num_threads(64)
        .build()
        .expect("valid configuration");
    let batch = stridepool::Batch::new(&kernel, &args, &steps, n as isize, std::ptr::null_mut());
    dispatcher.run(batch);

    assert_eq!(output, vec![100, 101, 102, 103, 104]);
}

#[test]
fn single_thread_runs_with_no_stealing() {
    let n = 10_000usize;
    let input: Vec<i32> = (0..n as i32).collect();
    let mut output = vec![0i32; n];
    let kernel = Unary::<i32, i32, _>::new(|x| x - 1);
    let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];
    let steps = [step_of::<i32>(), step_of::<i32>()];

    let dispatcher = DispatchBuilder::new()
        .num_threads(1)
        .build()
        .expect("valid configuration");
    let batch = stridepool::Batch::new(&kernel, &args, &steps, n as isize, std::ptr::null_mut());
    dispatcher.run(batch);

    for i in 0..n {
        assert_eq!(output[i], input[i] - 1);
    }
}

#[test]
fn zero_num_threads_is_rejected_at_build_time() {
    let err = DispatchBuilder::new().num_threads(0).build();
    assert!(err.is_err());
}

#[test]
fn zero_granularity_is_rejected_at_build_time() {
    let err = DispatchBuilder::new().granularity(0).build();
    assert!(err.is_err());
}
