//! Processor counters.
//!
//! Relaxed atomics, bumped on the hot path; [`ProcessorStats`] is a
//! point-in-time copy for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) scheduled: AtomicU64,
    pub(crate) succeeded: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cancels: AtomicU64,
    pub(crate) polls: AtomicU64,
    pub(crate) orphans: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active: usize) -> ProcessorStats {
        ProcessorStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancels_dispatched: self.cancels.load(Ordering::Relaxed),
            polls_dispatched: self.polls.load(Ordering::Relaxed),
            orphaned_records: self.orphans.load(Ordering::Relaxed),
            active,
        }
    }
}

/// Snapshot of processor activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Requests accepted by the engine.
    pub scheduled: u64,
    /// Requests that returned a response.
    pub succeeded: u64,
    /// Requests that ended in a transfer failure (cancellations included).
    pub failed: u64,
    /// Cancel commands sent to the worker.
    pub cancels_dispatched: u64,
    /// Poll commands sent to the worker.
    pub polls_dispatched: u64,
    /// Completion records that matched no pending request.
    pub orphaned_records: u64,
    /// Requests currently in flight.
    pub active: usize,
}

impl ProcessorStats {
    /// Requests that reached a terminal outcome.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed
    }
}
