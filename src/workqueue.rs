//! The per-thread `[next, last)` range and its CAS spin-lock.
//!
//! Owners claim from the front (`next`), stealers claim from the back
//! (`last`); the two only ever collide at the lock word itself, which is
//! the point of splitting the range this way instead of using a single
//! shared cursor.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// A `CachePadded<WorkQueue>` array is what `SharedContext` actually holds:
/// without the padding, one thread's hot writes to its own `next` would
/// share a cache line with a neighbor's `last`/`lock`, which a stealer
/// touches from another core.
pub(crate) type PaddedWorkQueue = CachePadded<WorkQueue>;

pub(crate) struct WorkQueue {
    next: AtomicIsize,
    last: AtomicIsize,
    lock: AtomicU32,
}

/// Observable state of a queue's `(next, last)` pair, used by tests to
/// assert the `POPULATED` / `STEAL-LOCKED-OUT` / `EMPTY` state machine is
/// monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueState {
    Populated,
    StealLockedOut,
    Empty,
}

impl WorkQueue {
    pub(crate) fn new(next: isize, last: isize) -> Self {
        debug_assert!(0 <= next && next <= last);
        WorkQueue {
            next: AtomicIsize::new(next),
            last: AtomicIsize::new(last),
            lock: AtomicU32::new(UNLOCKED),
        }
    }

    #[inline]
    fn acquire(&self) {
        while self
            .lock
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    #[inline]
    fn release(&self) {
        match self
            .lock
            .compare_exchange(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
        {
            Ok(_) => {}
            Err(observed) => {
                // The lock word was not `LOCKED` when we went to release it:
                // either a double-unlock or memory corruption. Either way the
                // partition invariant over `[0, N)` can no longer be trusted,
                // so there is nothing safe left to do but stop.
                eprintln!(
                    "stridepool: work queue lock corruption (observed {observed}, expected {LOCKED})"
                );
                std::process::abort();
            }
        }
    }

    /// Claim up to `granularity` items from the front of the range under the
    /// lock. Returns `(item, amt, last_snapshot)`: `item` is the first
    /// claimed index, `amt` the number claimed (`0` if the queue was already
    /// exhausted), and `last_snapshot` the value of `last` observed while
    /// still holding the lock (used by the caller to detect exhaustion
    /// without re-acquiring the lock).
    pub(crate) fn drain_front(&self, granularity: isize) -> (isize, isize, isize) {
        self.acquire();
        let item = self.next.load(Ordering::Relaxed);
        let last = self.last.load(Ordering::Relaxed);
        let avail = last - item;
        let amt = granularity.min(avail.max(0));
        self.next.store(item + amt, Ordering::Relaxed);
        self.release();
        (item, amt, last)
    }

    /// Attempt to steal exactly `granularity` items from the back. Returns
    /// the first index of the stolen range on success.
    pub(crate) fn steal_back(&self, granularity: isize) -> Option<isize> {
        self.acquire();
        let next = self.next.load(Ordering::Relaxed);
        let last = self.last.load(Ordering::Relaxed);
        let stolen = if next <= last - granularity {
            let new_last = last - granularity;
            self.last.store(new_last, Ordering::Relaxed);
            Some(new_last)
        } else {
            None
        };
        self.release();
        stolen
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> (isize, isize) {
        (
            self.next.load(Ordering::Relaxed),
            self.last.load(Ordering::Relaxed),
        )
    }

    #[cfg(test)]
    pub(crate) fn state(&self, granularity: isize) -> QueueState {
        let (next, last) = self.snapshot();
        if next == last {
            QueueState::Empty
        } else if last - next < granularity {
            QueueState::StealLockedOut
        } else {
            QueueState::Populated
        }
    }
}
