//! Error kinds and the per-job diagnostic tally.
//!
//! Two distinct failure channels exist in this crate, mirroring the
//! original's split between `Result`-returning setup calls and the
//! fire-and-forget diagnostic engine: `CoreError` is for contract
//! violations the caller must handle (a missing search path, a double
//! attach), while [`ErrorStatus`] is the atomic per-severity counter a
//! diagnostic report increments without unwinding.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::diagnostic::Severity;

/// A contract violation the facade cannot proceed past.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A source or installation file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A bad escape sequence or an unterminated literal/comment.
    #[error("{0}")]
    Lex(String),
    /// Unknown directive, unbalanced conditional, bad macro redefinition,
    /// recursive include, or a paste/stringize failure.
    #[error("{0}")]
    Preprocess(String),
    /// Unexpected token, missing semicolon, malformed declarator.
    #[error("{0}")]
    Syntax(String),
    /// Incompatible conversion, wrong builtin arity, conflicting
    /// redeclaration.
    #[error("{0}")]
    Type(String),
    /// A translation unit is already attached to a compilation unit.
    #[error("translation unit is already attached to a compilation unit")]
    AlreadyAttached,
    /// An impossible internal state was reached; the process should abort
    /// rather than limp forward with a corrupted pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Per-job tally of diagnostics emitted at each [`Severity`].
///
/// Counters only move up (spec.md P4): nothing in this crate ever
/// decrements a tally. Reads and writes are independent atomics, so
/// [`ErrorStatus::has_reports`] needs no lock even while a report is
/// concurrently being counted.
#[derive(Debug, Default)]
pub struct ErrorStatus {
    tally: [AtomicUsize; 4],
}

impl ErrorStatus {
    pub fn new() -> ErrorStatus {
        ErrorStatus::default()
    }

    /// Bumps the counter for `severity` by one. Monotonic: never resets.
    pub fn bump(&self, severity: Severity) {
        self.tally[severity as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current count at `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.tally[severity as usize].load(Ordering::Relaxed)
    }

    /// True iff any counter at or above `minimum` is positive.
    pub fn has_reports(&self, minimum: Severity) -> bool {
        Severity::ALL
            .iter()
            .filter(|s| **s >= minimum)
            .any(|s| self.count(*s) > 0)
    }
}
