//! Configuration: `DispatchBuilder` collects everything a batch needs
//! *besides* the batch's own data (thread count, granularity, thread
//! naming/stack size, and the optional panic/start/exit hooks), and is
//! consumed into an immutable, reusable [`Dispatcher`]. Unlike a
//! persistent thread-pool registry, a `Dispatcher` never keeps threads
//! alive between calls: every batch spawns and fully joins its own
//! fixed-size set of scoped threads.

use crate::error::{DispatchBuildError, ErrorKind};
use crate::{ExitHandler, PanicHandler, StartHandler};
use std::io;

pub(crate) const DEFAULT_GRANULARITY: usize = 256;

/// Per-thread metadata handed to a [`ThreadSpawn`] implementation.
#[derive(Debug, Clone)]
pub struct ThreadBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
    index: usize,
}

impl ThreadBuilder {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }
}

/// The platform thread adapter: a minimal `{spawn, join}` seam. `join`
/// itself is not part of the trait: every batch uses `std::thread::scope`,
/// which joins (and propagates panics from) every scoped thread
/// automatically when the scope exits, so only the "spawn with these
/// options, borrowing this scope" half is pluggable.
pub trait ThreadSpawn {
    /// Spawns `f` as a scoped thread configured per `builder`.
    fn spawn<'scope, 'env, F>(
        &self,
        scope: &'scope std::thread::Scope<'scope, 'env>,
        builder: ThreadBuilder,
        f: F,
    ) -> io::Result<()>
    where
        F: FnOnce() + Send + 'scope;
}

/// Spawns with plain `std::thread::Builder`, the default adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSpawn;

impl ThreadSpawn for DefaultSpawn {
    fn spawn<'scope, 'env, F>(
        &self,
        scope: &'scope std::thread::Scope<'scope, 'env>,
        builder: ThreadBuilder,
        f: F,
    ) -> io::Result<()>
    where
        F: FnOnce() + Send + 'scope,
    {
        let mut b = std::thread::Builder::new();
        if let Some(name) = builder.name {
            b = b.name(name);
        }
        if let Some(stack_size) = builder.stack_size {
            b = b.stack_size(stack_size);
        }
        b.spawn_scoped(scope, f)?;
        Ok(())
    }
}

/// Collects configuration for a [`Dispatcher`].
pub struct DispatchBuilder<S = DefaultSpawn> {
    num_threads: Option<usize>,
    granularity: Option<usize>,
    thread_name: Option<Box<dyn Fn(usize) -> String + Send + Sync>>,
    stack_size: Option<usize>,
    panic_handler: Option<Box<PanicHandler>>,
    start_handler: Option<Box<StartHandler>>,
    exit_handler: Option<Box<ExitHandler>>,
    audit_completion: bool,
    spawn_handler: S,
}

impl Default for DispatchBuilder<DefaultSpawn> {
    fn default() -> Self {
        DispatchBuilder::new()
    }
}

impl DispatchBuilder<DefaultSpawn> {
    pub fn new() -> Self {
        DispatchBuilder {
            num_threads: None,
            granularity: None,
            thread_name: None,
            stack_size: None,
            panic_handler: None,
            start_handler: None,
            exit_handler: None,
            audit_completion: cfg!(debug_assertions),
            spawn_handler: DefaultSpawn,
        }
    }
}

impl<S> DispatchBuilder<S>
where
    S: ThreadSpawn + Send + Sync,
{
    /// Number of worker threads to request for a batch. Degenerate batches
    /// (`N < num_threads`) still clamp down to `N` threads; this only sets
    /// the upper bound. Defaults to a platform query via the `num_cpus`
    /// crate.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Elements claimed per lock acquisition, for both local-drain and
    /// steal-check. Defaults to 256.
    pub fn granularity(mut self, granularity: usize) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn thread_name(mut self, closure: impl Fn(usize) -> String + Send + Sync + 'static) -> Self {
        self.thread_name = Some(Box::new(closure));
        self
    }

    pub fn panic_handler(mut self, handler: impl Fn(Box<dyn std::any::Any + Send>) + Send + Sync + 'static) -> Self {
        self.panic_handler = Some(Box::new(handler));
        self
    }

    pub fn start_handler(mut self, handler: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.start_handler = Some(Box::new(handler));
        self
    }

    pub fn exit_handler(mut self, handler: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.exit_handler = Some(Box::new(handler));
        self
    }

    /// Whether to assert `Σ completed == N` after every batch joins. On by
    /// default in debug builds; can be forced on in release via the
    /// `STRIDEPOOL_AUDIT=1` environment variable, or explicitly here.
    pub fn audit_completion(mut self, enabled: bool) -> Self {
        self.audit_completion = enabled;
        self
    }

    pub fn spawn_handler<S2>(self, spawn_handler: S2) -> DispatchBuilder<S2>
    where
        S2: ThreadSpawn + Send + Sync,
    {
        DispatchBuilder {
            num_threads: self.num_threads,
            granularity: self.granularity,
            thread_name: self.thread_name,
            stack_size: self.stack_size,
            panic_handler: self.panic_handler,
            start_handler: self.start_handler,
            exit_handler: self.exit_handler,
            audit_completion: self.audit_completion,
            spawn_handler,
        }
    }

    pub fn build(self) -> Result<crate::dispatch::Dispatcher<S>, DispatchBuildError> {
        let granularity = self.granularity.unwrap_or(DEFAULT_GRANULARITY);
        if granularity == 0 {
            return Err(DispatchBuildError::new(ErrorKind::ZeroGranularity));
        }

        let num_threads = match env_num_threads() {
            Some(n) => n,
            None => match self.num_threads {
                Some(0) => return Err(DispatchBuildError::new(ErrorKind::ZeroThreads)),
                Some(n) => n,
                None => default_num_threads(),
            },
        };
        if num_threads == 0 {
            return Err(DispatchBuildError::new(ErrorKind::ZeroThreads));
        }

        let audit_completion = self.audit_completion
            || std::env::var_os("STRIDEPOOL_AUDIT").is_some();

        Ok(crate::dispatch::Dispatcher::new(
            num_threads,
            granularity,
            self.thread_name,
            self.stack_size,
            self.panic_handler,
            self.start_handler,
            self.exit_handler,
            audit_completion,
            self.spawn_handler,
        ))
    }
}

/// Queries the platform for a default thread count via the `num_cpus`
/// crate. Picking `num_thread` is left to callers; this is only
/// convenience sugar for ones that do not want to make that choice
/// themselves.
pub fn default_num_threads() -> usize {
    num_cpus::get().max(1)
}

/// Lets an operator force the thread count at runtime via `STRIDEPOOL_NUM_THREADS`
/// without recompiling, overriding whatever `DispatchBuilder::num_threads` was
/// (or wasn't) set to. An unset, empty, or unparseable value is ignored.
fn env_num_threads() -> Option<usize> {
    std::env::var("STRIDEPOOL_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
}

pub(crate) fn make_thread_builder(
    index: usize,
    thread_name: Option<&(dyn Fn(usize) -> String + Send + Sync)>,
    stack_size: Option<usize>,
) -> ThreadBuilder {
    ThreadBuilder {
        name: thread_name.map(|f| f(index)),
        stack_size,
        index,
    }
}
