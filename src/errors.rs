//! Error taxonomy: stats/listing failures bubble up unchanged, delete
//! failures are accumulated and only surfaced if they contribute to a
//! shortfall, and cancellation is always reported as such.

use thiserror::Error;

use crate::fs_stats::StatsError;
use crate::runtime::RuntimeError;

/// A Detector run failed to list images or pods; the record store was not
/// mutated.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("detection cancelled")]
    Cancelled,
}

/// Accumulated per-image delete failures from a sweep. Does not stop the
/// sweep itself, but is surfaced to the caller so a shortfall can be
/// attributed to specific failures.
#[derive(Debug, Default, Clone)]
pub struct DeleteFailures {
    pub count: usize,
    pub attempted_bytes: u64,
    pub last_error: Option<String>,
}

impl DeleteFailures {
    pub fn record(&mut self, size: u64, err: &RuntimeError) {
        self.count += 1;
        self.attempted_bytes += size;
        self.last_error = Some(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl std::fmt::Display for DeleteFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} delete(s) failed ({} bytes attempted); last error: {}",
            self.count,
            self.attempted_bytes,
            self.last_error.as_deref().unwrap_or("none")
        )
    }
}

/// Top-level error returned by [`crate::controller::ImageGcManager`]
/// operations.
#[derive(Debug, Error)]
pub enum GcError {
    #[error("fetching image filesystem stats: {0}")]
    Stats(#[from] StatsError),
    #[error("listing runtime state: {0}")]
    Listing(#[from] DetectError),
    #[error(
        "could not free {requested} bytes, freed {freed}{}",
        failures.as_ref().map(|f| format!(" ({f})")).unwrap_or_default()
    )]
    Shortfall {
        requested: u64,
        freed: u64,
        failures: Option<DeleteFailures>,
    },
    #[error("operation cancelled")]
    Cancelled,
}

/// A cancellation token being cancelled maps uniformly to this across the
/// crate's entry points.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

impl From<Cancelled> for GcError {
    fn from(_: Cancelled) -> Self {
        GcError::Cancelled
    }
}

impl From<Cancelled> for DetectError {
    fn from(_: Cancelled) -> Self {
        DetectError::Cancelled
    }
}
