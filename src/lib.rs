//! `stridepool` is a parallel execution engine for elementwise numeric
//! kernels applied to arrays of uniform shape: given a scalar kernel
//! `f(a0, a1, …) -> r` and a batch of `N` input tuples laid out in strided
//! memory, it distributes the `N` invocations across a fixed pool of
//! worker threads and writes the `N` results back to a strided output
//! buffer.
//!
//! The engine itself does not generate or specialize `f` — that is the job
//! of a code generator or a concrete [`Kernel`] impl an embedding crate
//! hands it (see [`kernel::Unary`]/[`kernel::Binary`] for the closed family
//! of adapters this crate ships). What this crate owns is the hard part:
//! per-thread work queues guarded by a CAS spin-lock, a work-stealing
//! scheduler with a full-pass termination condition, the thread dispatch
//! sequence, and the strided per-element invocation loop.

mod batch;
mod builder;
mod context;
mod dispatch;
mod error;
mod kernel;
mod log;
mod nontemporal;
mod unwind;
mod worker;
mod workqueue;

pub use batch::Batch;
pub use builder::{default_num_threads, DefaultSpawn, DispatchBuilder, ThreadBuilder, ThreadSpawn};
pub use dispatch::Dispatcher;
pub use error::DispatchBuildError;
pub use kernel::{Binary, Kernel, Unary};

/// User callback invoked when a worker thread's kernel invocation (or a
/// start/exit handler) panics. Defaults to aborting the process if unset.
pub type PanicHandler = dyn Fn(Box<dyn std::any::Any + Send>) + Send + Sync;

/// User callback invoked once from inside each worker thread before it
/// begins draining its queue.
pub type StartHandler = dyn Fn(usize) + Send + Sync;

/// User callback invoked once from inside each worker thread after its
/// work (local-drain plus stealing) is done.
pub type ExitHandler = dyn Fn(usize) + Send + Sync;

/// Runs one batch against a fresh, default-configured [`Dispatcher`].
///
/// `args` and `steps` must each have `kernel.arity() + 1` entries (inputs
/// then the output slot). `num_thread` is an upper bound: a degenerate
/// batch with `len < num_thread` clamps down to `len` threads, each
/// handling exactly one element.
///
/// This is the Rust-ergonomic shape of the engine's external contract; see
/// [`run_parallel_raw`] for the literal C-ABI-shaped signature.
pub fn run_parallel(kernel: &dyn Kernel, args: &[*mut u8], steps: &[isize], len: isize, data: *mut (), num_thread: usize) {
    let batch = Batch::new(kernel, args, steps, len, data);
    let dispatcher = build_default_dispatcher(num_thread);
    dispatcher.run(batch);
}

/// The literal external-contract shape: `args`/`steps` are raw pointers to
/// arrays of `kernel.arity() + 1` entries, and `dimensions` points at a
/// single `isize` holding `N`.
///
/// # Safety
/// `args` and `steps` must each be valid for reads of `kernel.arity() + 1`
/// elements, and `dimensions` valid for one read. Every pointer in `args`
/// must be valid for `N` strided accesses of its argument's declared type
/// at the corresponding stride in `steps`, for the output slot as well as
/// the inputs.
pub unsafe fn run_parallel_raw(
    kernel: &dyn Kernel,
    args: *const *mut u8,
    dimensions: *const isize,
    steps: *const isize,
    data: *mut (),
    num_thread: u32,
) {
    let arity_plus_one = kernel.arity() + 1;
    let args = std::slice::from_raw_parts(args, arity_plus_one);
    let steps = std::slice::from_raw_parts(steps, arity_plus_one);
    let len = *dimensions;
    let batch = Batch::new(kernel, args, steps, len, data);
    let dispatcher = build_default_dispatcher(num_thread as usize);
    dispatcher.run(batch);
}

fn build_default_dispatcher(num_thread: usize) -> Dispatcher {
    let num_thread = if num_thread == 0 {
        default_num_threads()
    } else {
        num_thread
    };
    DispatchBuilder::new()
        .num_threads(num_thread)
        .build()
        .unwrap_or_else(|err| {
            // `num_threads`/`granularity` are both under our control here,
            // so this is not reachable in practice; treat it the same as
            // any other impossible-environment condition.
            eprintln!("stridepool: failed to build default dispatcher: {err}");
            std::process::abort();
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;
    use std::sync::atomic::{AtomicIsize, Ordering};

    fn contiguous_step<T>() -> isize {
        size_of::<T>() as isize
    }

    #[test]
    fn scenario_1_zero_length_batch_touches_nothing() {
        let kernel = Unary::<i32, i32, _>::new(|x| x + 1);
        let input: [i32; 0] = [];
        let mut output: [i32; 0] = [];
        let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];
        let steps = [contiguous_step::<i32>(), contiguous_step::<i32>()];
        run_parallel(&kernel, &args, &steps, 0, std::ptr::null_mut(), 4);
        assert!(output.is_empty());
    }

    #[test]
    fn scenario_2_single_element_uses_one_effective_thread() {
        let kernel = Unary::<i32, i32, _>::new(|x| 2 * x);
        let input = [21i32];
        let mut output = [0i32];
        let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];
        let steps = [contiguous_step::<i32>(), contiguous_step::<i32>()];
        run_parallel(&kernel, &args, &steps, 1, std::ptr::null_mut(), 4);
        assert_eq!(output[0], 42);
    }

    #[test]
    fn scenario_3_identity_kernel_matches_input_at_scale() {
        let n = 1000usize;
        let input: Vec<i64> = (0..n as i64).collect();
        let mut output = vec![0i64; n];
        let kernel = Unary::<i64, i64, _>::new(|x| x);
        let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];
        let steps = [contiguous_step::<i64>(), contiguous_step::<i64>()];
        run_parallel(&kernel, &args, &steps, n as isize, std::ptr::null_mut(), 4);
        assert_eq!(output, input);
    }

    #[test]
    fn scenario_4_binary_kernel_handles_non_multiple_length() {
        let n = 1025usize;
        let a: Vec<i32> = (0..n as i32).collect();
        let b: Vec<i32> = (0..n as i32).rev().collect();
        let mut out = vec![0i32; n];
        let kernel = Binary::<i32, i32, i32, _>::new(|x, y| x + y);
        let args = [
            a.as_ptr() as *mut u8,
            b.as_ptr() as *mut u8,
            out.as_mut_ptr() as *mut u8,
        ];
        let step = contiguous_step::<i32>();
        let steps = [step, step, step];
        run_parallel(&kernel, &args, &steps, n as isize, std::ptr::null_mut(), 4);
        for k in 0..n {
            assert_eq!(out[k], a[k] + b[k]);
        }
    }

    #[test]
    fn scenario_6_honors_non_contiguous_strides_against_sequential_reference() {
        let n = 10_000usize;
        // Interleave each f64 input with a padding slot to force a stride
        // larger than the element size.
        let mut records: Vec<[f64; 2]> = (0..n).map(|i| [i as f64, f64::NAN]).collect();
        let mut out_records: Vec<[f64; 2]> = vec![[0.0, 0.0]; n];
        let kernel = Unary::<f64, f64, _>::new(|x| x * x);
        let step = 2 * contiguous_step::<f64>();
        let args = [
            records.as_mut_ptr() as *mut u8,
            out_records.as_mut_ptr() as *mut u8,
        ];
        let steps = [step, step];
        run_parallel(&kernel, &args, &steps, n as isize, std::ptr::null_mut(), 2);

        for i in 0..n {
            assert_eq!(out_records[i][0], (i as f64) * (i as f64));
        }
    }

    #[test]
    fn repeated_runs_are_bitwise_idempotent() {
        let n = 5000usize;
        let input: Vec<i32> = (0..n as i32).map(|i| i.wrapping_mul(31)).collect();
        let kernel = Unary::<i32, i32, _>::new(|x| x.wrapping_mul(7).wrapping_add(3));
        let step = contiguous_step::<i32>();
        let steps = [step, step];

        let mut first = vec![0i32; n];
        let args1 = [input.as_ptr() as *mut u8, first.as_mut_ptr() as *mut u8];
        run_parallel(&kernel, &args1, &steps, n as isize, std::ptr::null_mut(), 4);

        let mut second = vec![0i32; n];
        let args2 = [input.as_ptr() as *mut u8, second.as_mut_ptr() as *mut u8];
        run_parallel(&kernel, &args2, &steps, n as isize, std::ptr::null_mut(), 4);

        assert_eq!(first, second);
    }

    #[test]
    fn accounting_matches_length_even_under_contention() {
        static COMPLETED: AtomicIsize = AtomicIsize::new(0);
        COMPLETED.store(0, Ordering::Relaxed);

        let n = 200_000usize;
        let input: Vec<i32> = (0..n as i32).collect();
        let mut output = vec![0i32; n];
        let kernel = Unary::<i32, i32, _>::new(|x| {
            COMPLETED.fetch_add(1, Ordering::Relaxed);
            x
        });
        let step = contiguous_step::<i32>();
        let steps = [step, step];
        let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];
        run_parallel(&kernel, &args, &steps, n as isize, std::ptr::null_mut(), 8);

        assert_eq!(output, input);
        assert_eq!(COMPLETED.load(Ordering::Relaxed), n as isize);
    }

    #[test]
    fn raw_entry_point_matches_the_safe_wrapper() {
        let n = 777isize;
        let input: Vec<i32> = (0..n as i32).collect();
        let mut output = vec![0i32; n as usize];
        let kernel = Unary::<i32, i32, _>::new(|x| x - 1);
        let step = contiguous_step::<i32>();
        let steps = [step, step];
        let args = [input.as_ptr() as *mut u8, output.as_mut_ptr() as *mut u8];

        unsafe {
            run_parallel_raw(
                &kernel,
                args.as_ptr(),
                &n as *const isize,
                steps.as_ptr(),
                std::ptr::null_mut(),
                4,
            );
        }

        for k in 0..n as usize {
            assert_eq!(output[k], input[k] - 1);
        }
    }
}
