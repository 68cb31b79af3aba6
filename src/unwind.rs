//! Abort-on-unexpected-panic helper: worker threads are not supposed to
//! unwind past their top-level frame, because by the time they would, the
//! sibling queues or the completion counters may be in a state no other
//! thread can reason about. A bare `AbortIfPanic` guard that is armed for
//! the duration of
//! "this must not panic" sections and `mem::forget`-disarmed on the
//! successful path gives us that without needing a `catch_unwind` at every
//! call site.

use std::panic::{self, AssertUnwindSafe};

/// Aborts the process when dropped while unwinding. `mem::forget` this once
/// the guarded section completes without panicking.
pub(crate) struct AbortIfPanic;

impl Drop for AbortIfPanic {
    fn drop(&mut self) {
        eprintln!("stridepool: worker thread is unwinding through code that must not panic; aborting");
        std::process::abort();
    }
}

/// Runs `func`, catching any panic instead of letting it unwind further.
pub(crate) fn halt_unwinding<F, R>(func: F) -> std::thread::Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(func))
}
