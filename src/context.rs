//! `SharedContext` and `ThreadContext`: the immutable-after-setup batch
//! descriptor and the per-thread mutable state, owned by the dispatcher's
//! stack frame for the duration of one batch.

use crate::kernel::Kernel;
use crate::log::Logger;
use crate::workqueue::PaddedWorkQueue;
use std::sync::atomic::{AtomicIsize, Ordering};

/// Immutable-after-setup descriptor of one batch. Borrowed by every worker
/// for the lifetime of the batch; never mutated after [`crate::dispatch`]
/// finishes populating `workqueues`, except through the `WorkQueue` lock
/// protocol itself.
pub(crate) struct SharedContext<'a> {
    pub(crate) kernel: &'a dyn Kernel,
    pub(crate) args: &'a [*mut u8],
    pub(crate) steps: &'a [isize],
    pub(crate) n: isize,
    pub(crate) data: *mut (),
    pub(crate) granularity: isize,
    pub(crate) workqueues: Vec<PaddedWorkQueue>,
    pub(crate) logger: Logger,
}

// SAFETY: `args` and `data` are raw pointers into the caller's buffers.
// Every index `[item, item + amt)` claimed out of `workqueues` is disjoint
// from every other thread's claimed range (see `workqueue::WorkQueue`'s
// lock protocol), so concurrent access to the pointees through different
// workers never aliases a write. The pointers themselves are read-only
// after construction.
unsafe impl Sync for SharedContext<'_> {}

impl<'a> SharedContext<'a> {
    pub(crate) fn num_threads(&self) -> usize {
        self.workqueues.len()
    }
}

/// Per-thread mutable descriptor. `completed` is written only by its owning
/// thread; readers (the post-join accounting audit) only observe it after
/// the owning thread has been joined, which provides the happens-before
/// relationship the accounting audit depends on. It is an atomic
/// purely so the containing `Vec` can be shared (read-only, index-disjoint)
/// across the scoped threads that each write to their own entry; no
/// particular memory ordering is load-bearing here.
pub(crate) struct ThreadContext {
    pub(crate) id: usize,
    completed: AtomicIsize,
}

impl ThreadContext {
    pub(crate) fn new(id: usize) -> Self {
        ThreadContext {
            id,
            completed: AtomicIsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn add_completed(&self, amt: isize) {
        self.completed.fetch_add(amt, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) -> isize {
        self.completed.load(Ordering::Relaxed)
    }
}
