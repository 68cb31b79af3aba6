//! The ergonomic Rust-facing description of one batch: a `Kernel`
//! implementation plus the raw argument pointers, length, per-argument
//! strides, and opaque data pointer from the engine's external contract.

use crate::kernel::Kernel;

/// One invocation of the engine over `N` element-indices.
///
/// `args` holds `kernel.arity() + 1` pointers: the inputs, then the single
/// output slot, each pointing at element 0 of that argument. `steps` holds
/// the matching byte strides. This mirrors the C-level `args`/`steps`
/// contract directly; see [`crate::run_parallel_raw`] for a function that
/// takes the literal pointer-array form instead of these slices.
pub struct Batch<'a> {
    pub kernel: &'a dyn Kernel,
    pub args: &'a [*mut u8],
    pub steps: &'a [isize],
    /// Number of elements (`dimensions[0]` in the raw contract).
    pub len: isize,
    /// Opaque pointer forwarded unchanged to the kernel.
    pub data: *mut (),
}

impl<'a> Batch<'a> {
    /// Constructs a batch, checking the shape invariants the dispatcher
    /// relies on (but not dereferencing any of the raw pointers).
    ///
    /// # Panics
    /// Panics if `args.len()` or `steps.len()` does not equal
    /// `kernel.arity() + 1`, or if `len` is negative.
    pub fn new(kernel: &'a dyn Kernel, args: &'a [*mut u8], steps: &'a [isize], len: isize, data: *mut ()) -> Self {
        let expected = kernel.arity() + 1;
        assert_eq!(args.len(), expected, "args.len() must equal kernel.arity() + 1");
        assert_eq!(steps.len(), expected, "steps.len() must equal kernel.arity() + 1");
        assert!(len >= 0, "batch length must not be negative");
        Batch {
            kernel,
            args,
            steps,
            len,
            data,
        }
    }

    pub(crate) fn len(&self) -> isize {
        self.len
    }
}
