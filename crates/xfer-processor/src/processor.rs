//! # Processor: the public face
//!
//! `execute_request()` walks one request through
//! `Registered → Scheduled → Polling → Resolved → Removed`:
//!
//! ```text
//! register(id)            → PendingResult (reader half kept here)
//! worker.schedule(req)    → TransferHandle
//! loop {
//!     own slot resolved?  → done
//!     worker poll         → batch; resolve every record in it (anyone's)
//!     own slot resolved?  → done
//!     sleep(poll_interval) or caller cancelled → worker.cancel(handle) once
//! }
//! ```
//!
//! Cancellation never short-circuits: after asking the engine to abort,
//! the caller keeps polling until the engine reports a terminal record
//! (usually a `Cancelled` failure, sometimes a late success).

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use xfer_core::completion::CompletionRecord;
use xfer_core::engine::TransferEngine;
use xfer_core::entry::{RequestDescriptor, RequestId, ResponseData, TransferHandle};
use xfer_core::error::{FailureCause, Result, XferError};

use crate::config::ProcessorConfig;
use crate::pending::{Outcome, PendingResult};
use crate::registry::PendingRegistry;
use crate::stats::{Counters, ProcessorStats};
use crate::worker::TransferWorker;

pub struct Processor {
    config: ProcessorConfig,
    registry: PendingRegistry,
    counters: Counters,
    closed: AtomicBool,
    // Declared last: dropping the worker joins its thread.
    worker: TransferWorker,
}

impl Processor {
    /// Validate `config`, spawn the worker and build the engine on it.
    pub fn start<E, F>(config: ProcessorConfig, factory: F) -> Result<Self>
    where
        E: TransferEngine + 'static,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        config.validate()?;
        let worker = TransferWorker::spawn(&config.worker_name, factory)?;
        Ok(Self {
            config,
            registry: PendingRegistry::new(),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
            worker,
        })
    }

    /// Run one request to its terminal outcome.
    ///
    /// Cancelling `cancel` asks the engine to abort the transfer; the call
    /// still returns only once the engine reports an outcome for it.
    ///
    /// # Errors
    ///
    /// - `Transfer(cause)`: the engine reported a failure (or refused to start).
    /// - `WorkerUnavailable`: the processor is closed or closing.
    /// - `DuplicateRequest`: a request with the same id is already in flight.
    #[tracing::instrument(level = "debug", skip_all, fields(request = %request.id()))]
    pub async fn execute_request(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseData> {
        let result = self.run(request, cancel).await;
        match &result {
            Ok(_) => Counters::bump(&self.counters.succeeded, 1),
            Err(XferError::Transfer(cause)) => {
                tracing::debug!("transfer failed: {}", cause);
                Counters::bump(&self.counters.failed, 1);
            }
            Err(e) => tracing::debug!("request aborted: {}", e),
        }
        result
    }

    /// [`execute_request`](Self::execute_request) without a cancellation context.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ResponseData> {
        self.execute_request(request, &CancellationToken::new()).await
    }

    async fn run(&self, request: RequestDescriptor, cancel: &CancellationToken) -> Result<ResponseData> {
        if self.is_closed() {
            return Err(XferError::WorkerUnavailable);
        }

        let id = request.id();
        let mut pending = self.registry.register(id)?;
        let mut registration = Registration {
            processor: self,
            id,
            handle: None,
        };

        let handle = self.worker.schedule(request).await?;
        registration.handle = Some(handle);
        Counters::bump(&self.counters.scheduled, 1);

        let outcome = self.wait_for(&mut pending, handle, cancel).await?;
        drop(registration);
        Ok(outcome?)
    }

    async fn wait_for(
        &self,
        pending: &mut PendingResult,
        handle: TransferHandle,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut cancel_sent = false;
        loop {
            if let Some(outcome) = pending.try_take()? {
                return Ok(outcome);
            }
            self.poll_once().await?;
            if let Some(outcome) = pending.try_take()? {
                return Ok(outcome);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled(), if !cancel_sent => {
                    cancel_sent = true;
                    tracing::debug!("caller cancelled, aborting {}", handle);
                    self.worker.cancel(handle, FailureCause::Cancelled("cancelled by caller".into()))?;
                    Counters::bump(&self.counters.cancels, 1);
                }
            }
        }
    }

    /// One poll round trip; every record in the batch is resolved here.
    async fn poll_once(&self) -> Result<()> {
        let rx = self.worker.dispatch_poll(self.config.poll_timeout)?;
        Counters::bump(&self.counters.polls, 1);
        let mut ticket = PollTicket {
            processor: self,
            rx: Some(rx),
        };
        let batch = ticket.recv().await?;
        self.absorb(batch);
        Ok(())
    }

    fn absorb(&self, batch: Vec<CompletionRecord>) {
        if batch.is_empty() {
            return;
        }
        let out = self.registry.resolve_batch(batch);
        if out.orphaned > 0 {
            Counters::bump(&self.counters.orphans, out.orphaned as u64);
        }
    }

    /// Close the engine and stop the worker. Single use.
    ///
    /// New requests fail with `WorkerUnavailable` from this point on.
    /// Requests already in flight end with `WorkerUnavailable` on their
    /// next poll. An engine close error is logged by the worker and
    /// returned here; the worker stops regardless.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(XferError::WorkerUnavailable);
        }
        tracing::info!(
            "{}: closing with {} requests in flight",
            self.worker.name(),
            self.registry.active_count()
        );
        self.worker.shutdown().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Requests currently in flight.
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.counters.snapshot(self.registry.active_count())
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// Keeps the registry entry honest on every exit path.
///
/// On drop, an entry still present means the caller left before its
/// record arrived: the entry is removed and the engine is asked to
/// abort the transfer.
struct Registration<'a> {
    processor: &'a Processor,
    id: RequestId,
    handle: Option<TransferHandle>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if !self.processor.registry.remove(self.id) {
            return;
        }
        let Some(handle) = self.handle else {
            return;
        };
        tracing::debug!("{}: abandoned, aborting {}", self.id, handle);
        let cause = FailureCause::Cancelled("caller abandoned request".into());
        if self.processor.worker.cancel(handle, cause).is_ok() {
            Counters::bump(&self.processor.counters.cancels, 1);
        }
    }
}

/// An outstanding poll reply.
///
/// If the poller is dropped while waiting, any batch that already
/// arrived is still resolved, so no record is lost with it.
struct PollTicket<'a> {
    processor: &'a Processor,
    rx: Option<oneshot::Receiver<Vec<CompletionRecord>>>,
}

impl PollTicket<'_> {
    async fn recv(&mut self) -> Result<Vec<CompletionRecord>> {
        let rx = self.rx.as_mut().ok_or(XferError::WorkerUnavailable)?;
        let result = rx.await;
        self.rx = None;
        result.map_err(|_| XferError::WorkerUnavailable)
    }
}

impl Drop for PollTicket<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(batch) = rx.try_recv() {
                self.processor.absorb(batch);
            }
        }
    }
}
