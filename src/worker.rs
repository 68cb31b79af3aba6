//! The per-thread main routine: drain the owned queue, then steal until a
//! full pass over every peer comes up empty.

use crate::context::{SharedContext, ThreadContext};
use crate::kernel::{compute_base_ptrs, MAX_ARGS};
use crate::log::Event;
use crate::unwind::{halt_unwinding, AbortIfPanic};
use crate::PanicHandler;

/// Runs the full worker routine for `ctx` against `shared`. Returns
/// normally once local-drain and (if enabled) the steal-loop both report no
/// more work anywhere. A kernel panic is caught and routed to
/// `panic_handler` (or the default abort) rather than unwinding out of a
/// scoped thread.
pub(crate) fn run(
    shared: &SharedContext<'_>,
    ctx: &ThreadContext,
    panic_handler: Option<&PanicHandler>,
    steal_enabled: bool,
) {
    let abort_guard = AbortIfPanic;

    match halt_unwinding(|| local_drain(shared, ctx)) {
        Ok(()) => {}
        Err(err) => {
            shared.logger.log(|| Event::WorkerPanicked { worker: ctx.id });
            dispatch_panic(panic_handler, err);
        }
    }

    if steal_enabled {
        match halt_unwinding(|| steal_loop(shared, ctx)) {
            Ok(()) => {}
            Err(err) => {
                shared.logger.log(|| Event::WorkerPanicked { worker: ctx.id });
                dispatch_panic(panic_handler, err);
            }
        }
    }

    shared.logger.log(|| Event::WorkerDone {
        worker: ctx.id,
        completed: ctx.completed(),
    });

    std::mem::forget(abort_guard);
}

fn dispatch_panic(panic_handler: Option<&PanicHandler>, err: Box<dyn std::any::Any + Send>) {
    match panic_handler {
        Some(handler) => {
            // If the user's own panic handler panics, that is exactly the
            // "must not panic" situation `AbortIfPanic` exists for.
            let guard = AbortIfPanic;
            handler(err);
            std::mem::forget(guard);
        }
        None => {
            eprintln!("stridepool: kernel panicked and no panic handler was configured; aborting");
            std::process::abort();
        }
    }
}

/// Drains the calling thread's own `WorkQueue` until it observes
/// `item >= last_snapshot`, i.e. the front has caught up to (or passed) the
/// last value of `last` seen while holding the lock.
fn local_drain(shared: &SharedContext<'_>, ctx: &ThreadContext) {
    let queue = &shared.workqueues[ctx.id];
    let arity_plus_one = shared.args.len();
    let mut base = [std::ptr::null_mut::<u8>(); MAX_ARGS];

    loop {
        let (item, amt, last_snapshot) = queue.drain_front(shared.granularity);

        if item >= last_snapshot {
            shared.logger.log(|| Event::LocalDrainExhausted { worker: ctx.id });
            break;
        }

        debug_assert!(
            item + amt <= shared.n,
            "queue claimed past the batch length: {item} + {amt} > {}",
            shared.n
        );

        shared.logger.log(|| Event::LocalDrainClaimed {
            worker: ctx.id,
            item,
            amt,
        });

        invoke(shared, &mut base[..arity_plus_one], item, amt);
        ctx.add_completed(amt);
    }
}

/// Repeatedly sweeps every peer queue in ascending index order, attempting a
/// steal from each, until one full pass claims nothing anywhere.
fn steal_loop(shared: &SharedContext<'_>, ctx: &ThreadContext) {
    let num_threads = shared.num_threads();
    if num_threads <= 1 {
        return;
    }

    let mut steal_continue = true;
    while steal_continue {
        steal_continue = false;
        for peer in 0..num_threads {
            if peer == ctx.id {
                continue;
            }
            if steal_check(shared, ctx, peer) {
                steal_continue = true;
            }
        }
        if !steal_continue {
            shared.logger.log(|| Event::StealPassExhausted { worker: ctx.id });
        }
    }
}

/// Attempts to steal exactly `granularity` elements from the back of
/// `shared.workqueues[peer]`. Returns whether the steal succeeded.
fn steal_check(shared: &SharedContext<'_>, ctx: &ThreadContext, peer: usize) -> bool {
    let queue = &shared.workqueues[peer];
    match queue.steal_back(shared.granularity) {
        Some(item) => {
            debug_assert!(
                item + shared.granularity <= shared.n,
                "steal claimed past the batch length: {item} + {} > {}",
                shared.granularity,
                shared.n
            );

            shared.logger.log(|| Event::StealSucceeded {
                worker: ctx.id,
                victim: peer,
                item,
                amt: shared.granularity,
            });

            let arity_plus_one = shared.args.len();
            let mut base = [std::ptr::null_mut::<u8>(); MAX_ARGS];
            invoke(shared, &mut base[..arity_plus_one], item, shared.granularity);
            ctx.add_completed(shared.granularity);
            true
        }
        None => false,
    }
}

/// Step 1 and step 3 of the strided kernel-invocation inner loop: compute
/// the per-argument base pointers for `item`, then hand off to the kernel
/// for the per-element load/call/store.
#[inline]
fn invoke(shared: &SharedContext<'_>, base: &mut [*mut u8], item: isize, amt: isize) {
    if amt <= 0 {
        return;
    }
    compute_base_ptrs(shared.args, shared.steps, item, base);
    // SAFETY: `base` was just computed from `shared.args`/`shared.steps` at
    // `item`, which the caller (local-drain or steal-check) has exclusive
    // ownership of for `[item, item + amt)` thanks to the WorkQueue lock
    // protocol. `base.len() == shared.steps.len() == kernel.arity() + 1`
    // by construction in `dispatch`.
    unsafe {
        shared
            .kernel
            .invoke_range(base, shared.steps, amt as usize, shared.data);
    }
}
