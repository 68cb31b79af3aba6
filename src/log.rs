//! A minimal, feature-gated event logger.
//!
//! This is a homegrown internal logging module rather than an external
//! structured-logging crate: the events below are
//! emitted from the hottest loop in the engine (every lock acquisition), so
//! the logging path has to compile away entirely in the default build. When
//! the `log` feature is off, [`Logger::log`] never evaluates its argument
//! for any work beyond a single relaxed bool check.

use std::fmt;

/// One diagnostic event. Kept small and `Debug`-only; this is not a
/// public-facing structured log, just a narration of dispatch internals for
/// whoever sets `STRIDEPOOL_LOG`.
#[derive(Debug)]
pub(crate) enum Event {
    BatchStart { num_threads: usize, len: isize, granularity: isize },
    QueueAssigned { worker: usize, next: isize, last: isize },
    LocalDrainClaimed { worker: usize, item: isize, amt: isize },
    LocalDrainExhausted { worker: usize },
    StealSucceeded { worker: usize, victim: usize, item: isize, amt: isize },
    StealPassExhausted { worker: usize },
    WorkerPanicked { worker: usize },
    WorkerDone { worker: usize, completed: isize },
    CompletionAudit { expected: isize, actual: isize },
}

pub(crate) struct Logger {
    enabled: bool,
}

impl Logger {
    pub(crate) fn new() -> Self {
        Logger {
            enabled: cfg!(feature = "log") && std::env::var_os("STRIDEPOOL_LOG").is_some(),
        }
    }

    #[inline]
    pub(crate) fn log(&self, event: impl FnOnce() -> Event) {
        if self.enabled {
            self.log_cold(event());
        }
    }

    #[cold]
    fn log_cold(&self, event: Event) {
        eprintln!("[stridepool] {}", Display(&event));
    }
}

struct Display<'a>(&'a Event);

impl fmt::Display for Display<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
