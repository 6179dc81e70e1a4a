//! `ScriptedEngine`: an engine driven by the test that owns its
//! [`ScriptHandle`].
//!
//! The engine itself lives on the transfer worker thread. The handle is
//! `Send + Sync + Clone` and talks to it through lock-free queues:
//!
//! ```text
//!   test ──push_batch()──► SegQueue<Vec<CompletionRecord>> ──poll──► worker
//!   test ◄──scheduled()─── Mutex<Vec<(handle, request)>>   ◄─schedule─ worker
//!   test ◄──cancels()───── Mutex<Vec<(handle, cause)>>     ◄─cancel─── worker
//! ```
//!
//! Each `push_batch()` is returned whole by exactly one `poll_completed()`,
//! in push order.

use xfer_core::engine::TransferEngine;
use xfer_core::entry::{RequestDescriptor, TransferHandle};
use xfer_core::error::{FailureCause, Result, XferError};
use xfer_core::CompletionRecord;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct ScriptState {
    batches: SegQueue<Vec<CompletionRecord>>,
    scheduled: Mutex<Vec<(TransferHandle, RequestDescriptor)>>,
    cancels: Mutex<Vec<(TransferHandle, FailureCause)>>,
    refuse_schedule: Mutex<Option<FailureCause>>,
    close_error: Mutex<Option<String>>,
    /// When set, a cancel of a live handle is answered with a `Failure`.
    fail_on_cancel: AtomicBool,
    polls: AtomicU64,
    closed: AtomicBool,
}

/// Test-side control of a [`ScriptedEngine`].
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<ScriptState>,
}

impl ScriptHandle {
    /// Queue one batch for the next `poll_completed()`.
    pub fn push_batch(&self, batch: Vec<CompletionRecord>) {
        self.state.batches.push(batch);
    }

    /// Queue a single-record batch.
    pub fn complete(&self, record: CompletionRecord) {
        self.push_batch(vec![record]);
    }

    /// Everything scheduled so far, in schedule order.
    pub fn scheduled(&self) -> Vec<(TransferHandle, RequestDescriptor)> {
        self.state.scheduled.lock().clone()
    }

    /// Every cancel the engine received, including no-op ones.
    pub fn cancels(&self) -> Vec<(TransferHandle, FailureCause)> {
        self.state.cancels.lock().clone()
    }

    /// Make subsequent `schedule()` calls fail synchronously.
    pub fn refuse_schedule(&self, cause: Option<FailureCause>) {
        *self.state.refuse_schedule.lock() = cause;
    }

    /// Make `close()` report an error (it still releases everything).
    pub fn fail_close(&self, message: impl Into<String>) {
        *self.state.close_error.lock() = Some(message.into());
    }

    pub fn set_fail_on_cancel(&self, enabled: bool) {
        self.state.fail_on_cancel.store(enabled, Ordering::Release);
    }

    pub fn polls(&self) -> u64 {
        self.state.polls.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

pub struct ScriptedEngine {
    state: Arc<ScriptState>,
    next_handle: u64,
    live: HashMap<TransferHandle, RequestDescriptor>,
    /// Cancellation failures produced by `cancel()`, reported on next poll.
    aborted: Vec<CompletionRecord>,
}

impl ScriptedEngine {
    /// Create an engine and its control handle. Cancels of live handles
    /// produce a `Failure` record by default.
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(ScriptState::default());
        state.fail_on_cancel.store(true, Ordering::Relaxed);
        let engine = Self {
            state: Arc::clone(&state),
            next_handle: 1,
            live: HashMap::new(),
            aborted: Vec::new(),
        };
        (engine, ScriptHandle { state })
    }
}

impl TransferEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn schedule(&mut self, request: RequestDescriptor) -> std::result::Result<TransferHandle, FailureCause> {
        if let Some(cause) = self.state.refuse_schedule.lock().clone() {
            return Err(cause);
        }
        let handle = TransferHandle::from_raw(self.next_handle);
        self.next_handle += 1;
        self.state.scheduled.lock().push((handle, request.clone()));
        self.live.insert(handle, request);
        Ok(handle)
    }

    fn poll_completed(&mut self, timeout: Duration) -> Vec<CompletionRecord> {
        self.state.polls.fetch_add(1, Ordering::AcqRel);

        let mut batch = std::mem::take(&mut self.aborted);
        if let Some(pushed) = self.state.batches.pop() {
            batch.extend(pushed);
        }
        if batch.is_empty() {
            std::thread::sleep(timeout);
            return batch;
        }

        for record in &batch {
            let id = record.id();
            self.live.retain(|_, req| req.id() != id);
        }
        batch
    }

    fn cancel(&mut self, handle: TransferHandle, cause: FailureCause) {
        self.state.cancels.lock().push((handle, cause.clone()));
        if !self.state.fail_on_cancel.load(Ordering::Acquire) {
            return;
        }
        if let Some(request) = self.live.remove(&handle) {
            self.aborted.push(CompletionRecord::Failure(request, cause));
        }
    }

    fn inflight(&self) -> usize {
        self.live.len() + self.aborted.len()
    }

    fn close(&mut self) -> Result<()> {
        self.state.closed.store(true, Ordering::Release);
        self.live.clear();
        self.aborted.clear();
        match self.state.close_error.lock().take() {
            Some(msg) => Err(XferError::EngineClose(msg)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_core::ResponseData;

    #[test]
    fn test_pushed_batch_returned_once_in_order() {
        let (mut engine, script) = ScriptedEngine::new();
        let a = RequestDescriptor::get("http://a/");
        let b = RequestDescriptor::get("http://b/");
        engine.schedule(a.clone()).unwrap();
        engine.schedule(b.clone()).unwrap();
        assert_eq!(script.scheduled().len(), 2);

        script.push_batch(vec![
            CompletionRecord::Success(b.clone(), ResponseData::new(200, "b")),
            CompletionRecord::Success(a.clone(), ResponseData::new(200, "a")),
        ]);

        let batch = engine.poll_completed(Duration::ZERO);
        let ids: Vec<_> = batch.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
        assert!(engine.poll_completed(Duration::ZERO).is_empty());
        assert_eq!(engine.inflight(), 0);
        assert_eq!(script.polls(), 2);
    }

    #[test]
    fn test_cancel_live_then_finished() {
        let (mut engine, script) = ScriptedEngine::new();
        let req = RequestDescriptor::get("http://a/");
        let handle = engine.schedule(req).unwrap();

        engine.cancel(handle, FailureCause::Cancelled("x".into()));
        let batch = engine.poll_completed(Duration::ZERO);
        assert_eq!(batch.len(), 1);
        assert!(matches!(&batch[0], CompletionRecord::Failure(_, c) if c.is_cancelled()));

        // Already finished: recorded, but nothing new is reported.
        engine.cancel(handle, FailureCause::Cancelled("y".into()));
        assert!(engine.poll_completed(Duration::ZERO).is_empty());
        assert_eq!(script.cancels().len(), 2);
    }

    #[test]
    fn test_cancel_without_failure() {
        let (mut engine, script) = ScriptedEngine::new();
        script.set_fail_on_cancel(false);
        let handle = engine.schedule(RequestDescriptor::get("http://a/")).unwrap();
        engine.cancel(handle, FailureCause::Cancelled("x".into()));
        assert!(engine.poll_completed(Duration::ZERO).is_empty());
        assert_eq!(engine.inflight(), 1);
    }

    #[test]
    fn test_refuse_and_close_error() {
        let (mut engine, script) = ScriptedEngine::new();
        script.refuse_schedule(Some(FailureCause::Engine("full".into())));
        assert_eq!(
            engine.schedule(RequestDescriptor::get("http://a/")),
            Err(FailureCause::Engine("full".into()))
        );

        script.fail_close("boom");
        assert!(matches!(engine.close(), Err(XferError::EngineClose(m)) if m == "boom"));
        assert!(script.is_closed());
    }
}
