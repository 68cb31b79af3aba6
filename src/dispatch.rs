//! The dispatcher: turns `(args, dimensions, steps, data)` plus a `Kernel`
//! into populated `WorkQueue`/`ThreadContext` arrays, spawns one scoped
//! thread per queue, joins them all, and (optionally) audits that every
//! element was accounted for exactly once.

use crate::batch::Batch;
use crate::builder::{make_thread_builder, ThreadBuilder, ThreadSpawn};
use crate::context::{SharedContext, ThreadContext};
use crate::log::{Event, Logger};
use crate::unwind::halt_unwinding;
use crate::workqueue::{PaddedWorkQueue, WorkQueue};
use crate::{ExitHandler, PanicHandler, StartHandler};
use crossbeam_utils::CachePadded;

/// Configured, reusable object that runs batches. Holds no OS resources
/// itself: every call to [`Dispatcher::run`] spawns and fully joins its own
/// fixed-size set of threads, so a `Dispatcher` is safe to keep around and
/// reuse across many unrelated batches.
pub struct Dispatcher<S = crate::builder::DefaultSpawn> {
    num_threads: usize,
    granularity: usize,
    thread_name: Option<Box<dyn Fn(usize) -> String + Send + Sync>>,
    stack_size: Option<usize>,
    panic_handler: Option<Box<PanicHandler>>,
    start_handler: Option<Box<StartHandler>>,
    exit_handler: Option<Box<ExitHandler>>,
    audit_completion: bool,
    spawn_handler: S,
}

impl<S> Dispatcher<S>
where
    S: ThreadSpawn + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        num_threads: usize,
        granularity: usize,
        thread_name: Option<Box<dyn Fn(usize) -> String + Send + Sync>>,
        stack_size: Option<usize>,
        panic_handler: Option<Box<PanicHandler>>,
        start_handler: Option<Box<StartHandler>>,
        exit_handler: Option<Box<ExitHandler>>,
        audit_completion: bool,
        spawn_handler: S,
    ) -> Self {
        Dispatcher {
            num_threads,
            granularity,
            thread_name,
            stack_size,
            panic_handler,
            start_handler,
            exit_handler,
            audit_completion,
            spawn_handler,
        }
    }

    /// Runs one batch to completion. On return, every output slot has been
    /// written exactly once. Thread spawn failure, thread join failure
    /// (including an uncaught worker panic), or a completion-accounting
    /// mismatch are all treated as environmental impossibilities and abort
    /// the process rather than returning an error.
    pub fn run(&self, batch: Batch<'_>) {
        let n = batch.len();
        debug_assert_eq!(batch.args.len(), batch.steps.len());
        debug_assert_eq!(batch.args.len(), batch.kernel.arity() + 1);

        let logger = Logger::new();

        // Compute the per-thread chunk size, clamping down when N < T.
        let (num_threads, chunk) = chunk_plan(n, self.num_threads);

        logger.log(|| Event::BatchStart {
            num_threads,
            len: n,
            granularity: self.granularity as isize,
        });

        if num_threads == 0 {
            // N == 0: no work, no threads, nothing to audit.
            return;
        }

        let workqueues = build_workqueues(n, num_threads, chunk, &logger);
        let thread_contexts: Vec<ThreadContext> = (0..num_threads).map(ThreadContext::new).collect();

        let shared = SharedContext {
            kernel: batch.kernel,
            args: batch.args,
            steps: batch.steps,
            n,
            data: batch.data,
            granularity: self.granularity as isize,
            workqueues,
            logger,
        };

        std::thread::scope(|scope| {
            for ctx in &thread_contexts {
                self.spawn_one(scope, &shared, ctx);
            }
        });

        if self.audit_completion {
            let total: isize = thread_contexts.iter().map(ThreadContext::completed).sum();
            shared.logger.log(|| Event::CompletionAudit {
                expected: n,
                actual: total,
            });
            if total != n {
                eprintln!(
                    "stridepool: completion accounting mismatch: expected {n}, observed {total}; \
                     a race lost or duplicated work"
                );
                std::process::abort();
            }
        }
    }

    fn spawn_one<'scope>(
        &'scope self,
        scope: &'scope std::thread::Scope<'scope, '_>,
        shared: &'scope SharedContext<'_>,
        ctx: &'scope ThreadContext,
    ) {
        let builder: ThreadBuilder = make_thread_builder(
            ctx.id,
            self.thread_name.as_deref(),
            self.stack_size,
        );

        let panic_handler = self.panic_handler.as_deref();
        let start_handler = self.start_handler.as_deref();
        let exit_handler = self.exit_handler.as_deref();

        let body = move || {
            if let Some(handler) = start_handler {
                if let Err(err) = halt_unwinding(|| handler(ctx.id)) {
                    dispatch_start_exit_panic(panic_handler, err);
                }
            }

            crate::worker::run(shared, ctx, panic_handler, true);

            if let Some(handler) = exit_handler {
                if let Err(err) = halt_unwinding(|| handler(ctx.id)) {
                    dispatch_start_exit_panic(panic_handler, err);
                }
            }
        };

        if let Err(err) = self.spawn_handler.spawn(scope, builder, body) {
            eprintln!("stridepool: failed to spawn worker thread {}: {err}", ctx.id);
            std::process::abort();
        }
    }
}

fn dispatch_start_exit_panic(panic_handler: Option<&PanicHandler>, err: Box<dyn std::any::Any + Send>) {
    match panic_handler {
        Some(handler) => handler(err),
        None => {
            eprintln!("stridepool: start/exit handler panicked; aborting");
            std::process::abort();
        }
    }
}

/// `chunk = N / T`; if that is zero, each thread gets exactly one element
/// and `T` is clamped down to `N`.
fn chunk_plan(n: isize, requested_threads: usize) -> (usize, isize) {
    if n <= 0 {
        return (0, 0);
    }
    let t = requested_threads.max(1) as isize;
    let chunk = n / t;
    if chunk == 0 {
        (n as usize, 1)
    } else {
        (requested_threads.max(1), chunk)
    }
}

fn build_workqueues(n: isize, num_threads: usize, chunk: isize, logger: &Logger) -> Vec<PaddedWorkQueue> {
    let mut workqueues = Vec::with_capacity(num_threads);
    for i in 0..num_threads {
        let next = (i as isize) * chunk;
        // The last queue absorbs the remainder `N mod T`.
        let last = if i + 1 == num_threads {
            n
        } else {
            (i as isize + 1) * chunk
        };
        logger.log(|| Event::QueueAssigned {
            worker: i,
            next,
            last,
        });
        workqueues.push(CachePadded::new(WorkQueue::new(next, last)));
    }
    workqueues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_plan_degenerate_zero() {
        assert_eq!(chunk_plan(0, 4), (0, 0));
    }

    #[test]
    fn chunk_plan_n_less_than_threads() {
        assert_eq!(chunk_plan(1, 4), (1, 1));
        assert_eq!(chunk_plan(3, 8), (3, 1));
    }

    #[test]
    fn chunk_plan_even_division() {
        assert_eq!(chunk_plan(1000, 4), (4, 250));
    }

    #[test]
    fn chunk_plan_with_remainder() {
        // 1025 / 4 == 256, remainder handled by widening the last queue.
        assert_eq!(chunk_plan(1025, 4), (4, 256));
    }
}
