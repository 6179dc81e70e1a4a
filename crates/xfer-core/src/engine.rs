//! Native transfer engine abstraction.
//!
//! A `TransferEngine` owns the actual protocol I/O: it accepts request
//! descriptors, drives them on its own, and reports terminal outcomes
//! through `poll_completed()`.
//!
//! # Implementors
//!
//! - `LoopbackEngine` (xfer-module): in-process engine that echoes the
//!   request body back after a configurable latency. For smoke runs.
//!
//! - `ScriptedEngine` (xfer-module): completions are pushed by a test
//!   through a `ScriptHandle`. Deterministic, for unit tests.
//!
//! - Bindings to a real native library implement this trait over its
//!   C API. They are free to hold raw pointers and thread-affine state.
//!
//! # Threading
//!
//! The trait has no `Send`/`Sync` bound. An engine is built on the worker
//! thread (from a `Send` factory) and never leaves it, so every method
//! is called from that one thread only.

use std::time::Duration;

use crate::completion::CompletionRecord;
use crate::entry::{RequestDescriptor, TransferHandle};
use crate::error::{FailureCause, Result};

/// Single-threaded transfer engine.
///
/// **Contract:**
/// - `schedule()` never blocks on I/O; it queues the transfer and returns
///   its handle. A synchronous `Err` means the transfer never started.
/// - Every scheduled request yields exactly one [`CompletionRecord`] from
///   some later `poll_completed()` call, cancelled ones included.
/// - `cancel()` is best-effort and must tolerate handles that already
///   completed or were never issued.
/// - After `close()`, no other method is called.
pub trait TransferEngine {
    /// Short name for logs.
    fn name(&self) -> &'static str {
        "engine"
    }

    /// Queue one transfer. The engine takes ownership of the descriptor.
    fn schedule(&mut self, request: RequestDescriptor) -> std::result::Result<TransferHandle, FailureCause>;

    /// Drain finished transfers, blocking up to `timeout` if none are ready.
    ///
    /// Returns an empty batch on timeout. Records within a batch are in
    /// the order the engine finished them.
    fn poll_completed(&mut self, timeout: Duration) -> Vec<CompletionRecord>;

    /// Ask the engine to abort a transfer. The engine is expected to
    /// report a `Failure` record for it later, unless it already finished.
    fn cancel(&mut self, handle: TransferHandle, cause: FailureCause);

    /// How many transfers are scheduled but not yet reported.
    fn inflight(&self) -> usize;

    /// Release all engine resources.
    fn close(&mut self) -> Result<()>;
}

impl<E: TransferEngine + ?Sized> TransferEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn schedule(&mut self, request: RequestDescriptor) -> std::result::Result<TransferHandle, FailureCause> {
        (**self).schedule(request)
    }

    fn poll_completed(&mut self, timeout: Duration) -> Vec<CompletionRecord> {
        (**self).poll_completed(timeout)
    }

    fn cancel(&mut self, handle: TransferHandle, cause: FailureCause) {
        (**self).cancel(handle, cause)
    }

    fn inflight(&self) -> usize {
        (**self).inflight()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
