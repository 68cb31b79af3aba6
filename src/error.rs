//! Build-time configuration errors.
//!
//! These are the only recoverable errors the crate exposes: everything that
//! can go wrong *after* a batch has started (thread spawn/join failure, lock
//! corruption, a completion-accounting mismatch) is an environmental
//! impossibility and is handled by aborting the process instead (see
//! `unwind::AbortIfPanic` and the call sites in `dispatch`).

use std::fmt;

/// The reason a [`crate::DispatchBuilder::build`] call failed.
#[derive(Debug)]
pub(crate) enum ErrorKind {
    /// `granularity` was set to zero, which would make every steal check
    /// succeed trivially and every drain claim nothing.
    ZeroGranularity,
    /// `num_threads` was explicitly set to zero.
    ZeroThreads,
}

/// Error returned by [`crate::DispatchBuilder::build`].
#[derive(Debug)]
pub struct DispatchBuildError {
    kind: ErrorKind,
}

impl DispatchBuildError {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        DispatchBuildError { kind }
    }
}

impl fmt::Display for DispatchBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::ZeroGranularity => {
                write!(f, "granularity must be at least 1")
            }
            ErrorKind::ZeroThreads => {
                write!(f, "num_threads must be at least 1")
            }
        }
    }
}

impl std::error::Error for DispatchBuildError {}
