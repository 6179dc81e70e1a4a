//! # Transfer worker: the engine's only thread
//!
//! The worker runs on a dedicated OS thread. It:
//! 1. Builds the engine from a `Send` factory (the engine itself never moves)
//! 2. Receives `Command`s from an unbounded MPSC channel, in send order
//! 3. Calls exactly one engine method per command
//! 4. Answers on the command's oneshot reply channel
//! 5. On `Close` (or when every sender is gone) closes the engine and exits
//!
//! Because every engine call is a message, the engine never observes
//! concurrent access, and `Close` is serialized with everything else.
//! Commands still queued when the worker exits are dropped; their callers
//! see `WorkerUnavailable`.

use xfer_core::completion::CompletionRecord;
use xfer_core::engine::TransferEngine;
use xfer_core::entry::{RequestDescriptor, TransferHandle};
use xfer_core::error::{FailureCause, Result, XferError};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use std::thread;
use std::time::Duration;

type ScheduleReply = oneshot::Sender<std::result::Result<TransferHandle, FailureCause>>;

/// A message from the processor to the worker.
enum Command {
    Schedule {
        request: RequestDescriptor,
        reply: ScheduleReply,
    },
    Poll {
        timeout: Duration,
        reply: oneshot::Sender<Vec<CompletionRecord>>,
    },
    Cancel {
        handle: TransferHandle,
        cause: FailureCause,
    },
    Close {
        reply: Option<oneshot::Sender<Result<()>>>,
    },
}

/// Handle to the worker thread.
///
/// Dropping it closes the engine (if not yet closed) and joins the thread.
pub struct TransferWorker {
    tx: Sender<Command>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    name: String,
}

impl TransferWorker {
    /// Spawn the worker thread and build the engine on it.
    ///
    /// Returns once the engine exists. A factory error (or a panic in
    /// the factory) comes back as `EngineSetup`.
    pub fn spawn<E, F>(name: &str, factory: F) -> Result<Self>
    where
        E: TransferEngine + 'static,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<Command>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<&'static str>>(1);
        let worker_name = name.to_string();

        let thread = thread::Builder::new()
            .name(worker_name.clone())
            .spawn(move || {
                let engine = match factory() {
                    Ok(engine) => engine,
                    Err(e) => {
                        tracing::error!("{}: engine setup failed: {}", worker_name, e);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(engine.name()));
                drop(ready_tx);
                worker_loop(engine, rx, &worker_name);
            })
            .map_err(|e| XferError::EngineSetup(format!("failed to spawn {}: {}", name, e)))?;

        match ready_rx.recv() {
            Ok(Ok(engine_name)) => {
                tracing::info!("{}: started: engine={}", name, engine_name);
                Ok(Self {
                    tx,
                    thread: Mutex::new(Some(thread)),
                    name: name.to_string(),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(match e {
                    XferError::EngineSetup(_) => e,
                    other => XferError::EngineSetup(other.to_string()),
                })
            }
            Err(_) => {
                let _ = thread.join();
                Err(XferError::EngineSetup(format!("{} exited during engine setup", name)))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| XferError::WorkerUnavailable)
    }

    /// Hand `request` to the engine and wait for its handle.
    ///
    /// A synchronous engine refusal comes back as `XferError::Transfer`.
    pub async fn schedule(&self, request: RequestDescriptor) -> Result<TransferHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Schedule { request, reply })?;
        Ok(rx.await.map_err(|_| XferError::WorkerUnavailable)??)
    }

    /// Queue one poll. The receiver yields the batch.
    pub fn dispatch_poll(&self, timeout: Duration) -> Result<oneshot::Receiver<Vec<CompletionRecord>>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Poll { timeout, reply })?;
        Ok(rx)
    }

    /// Poll the engine once, blocking it up to `timeout`.
    pub async fn poll_completed_batch(&self, timeout: Duration) -> Result<Vec<CompletionRecord>> {
        self.dispatch_poll(timeout)?
            .await
            .map_err(|_| XferError::WorkerUnavailable)
    }

    /// Ask the engine to abort `handle`. Fire-and-forget.
    pub fn cancel(&self, handle: TransferHandle, cause: FailureCause) -> Result<()> {
        self.send(Command::Cancel { handle, cause })
    }

    /// Close the engine and stop the worker.
    ///
    /// The worker terminates even if the engine reports a close error;
    /// that error is returned here.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Close { reply: Some(reply) })?;
        rx.await.map_err(|_| XferError::WorkerUnavailable)?
    }

    /// Close (if still running) and join the thread.
    pub fn shutdown_blocking(&self) {
        let _ = self.send(Command::Close { reply: None });
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                tracing::error!("{}: worker thread panicked", self.name);
            }
        }
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        self.shutdown_blocking();
    }
}

/// The worker loop: runs on the dedicated thread until `Close`.
fn worker_loop<E: TransferEngine>(mut engine: E, rx: Receiver<Command>, name: &str) {
    // Batches whose poller left before the reply; handed to the next poller.
    let mut undelivered: Vec<CompletionRecord> = Vec::new();
    let mut close_reply = None;

    loop {
        let cmd = match rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => {
                tracing::debug!("{}: all handles dropped", name);
                break;
            }
        };

        match cmd {
            Command::Schedule { request, reply } => {
                let id = request.id();
                let result = engine.schedule(request);
                match &result {
                    Ok(handle) => tracing::debug!("{}: scheduled {} as {}", name, id, handle),
                    Err(cause) => tracing::debug!("{}: engine refused {}: {}", name, id, cause),
                }
                if let Err(Ok(handle)) = reply.send(result) {
                    tracing::debug!("{}: submitter of {} left, aborting {}", name, id, handle);
                    engine.cancel(handle, FailureCause::Cancelled("submitter went away".into()));
                }
            }
            Command::Poll { timeout, reply } => {
                let mut batch = std::mem::take(&mut undelivered);
                if batch.is_empty() {
                    batch = engine.poll_completed(timeout);
                } else {
                    batch.extend(engine.poll_completed(Duration::ZERO));
                }
                if !batch.is_empty() {
                    tracing::trace!("{}: poll returned {} records", name, batch.len());
                }
                if let Err(batch) = reply.send(batch) {
                    undelivered = batch;
                }
            }
            Command::Cancel { handle, cause } => {
                tracing::debug!("{}: cancel {} ({})", name, handle, cause);
                engine.cancel(handle, cause);
            }
            Command::Close { reply } => {
                close_reply = reply;
                break;
            }
        }
    }

    let inflight = engine.inflight();
    let result = engine.close();
    if let Err(e) = &result {
        tracing::error!("{}: {}", name, e);
    }
    tracing::info!(
        "{}: shutdown: {} transfers in flight, {} records undelivered",
        name,
        inflight,
        undelivered.len()
    );
    if let Some(reply) = close_reply {
        let _ = reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_core::ResponseData;
    use xfer_module::ScriptedEngine;

    #[tokio::test]
    async fn test_schedule_poll_close() {
        let (engine, script) = ScriptedEngine::new();
        let worker = TransferWorker::spawn("xfer-test", move || Ok(engine)).unwrap();

        let req = RequestDescriptor::get("http://a/");
        let handle = worker.schedule(req.clone()).await.unwrap();
        assert_eq!(script.scheduled()[0].0, handle);

        script.complete(CompletionRecord::Success(req.clone(), ResponseData::new(200, "a")));
        let batch = worker.poll_completed_batch(Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), req.id());

        worker.shutdown().await.unwrap();
        assert!(script.is_closed());
        assert!(matches!(
            worker.schedule(RequestDescriptor::get("http://b/")).await,
            Err(XferError::WorkerUnavailable)
        ));
        assert!(matches!(
            worker.cancel(handle, FailureCause::Cancelled("late".into())),
            Err(XferError::WorkerUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_schedule_refusal_is_transfer_error() {
        let (engine, script) = ScriptedEngine::new();
        script.refuse_schedule(Some(FailureCause::Engine("queue full".into())));
        let worker = TransferWorker::spawn("xfer-test", move || Ok(engine)).unwrap();

        let err = worker.schedule(RequestDescriptor::get("http://a/")).await.unwrap_err();
        assert!(matches!(err, XferError::Transfer(FailureCause::Engine(_))));
    }

    #[test]
    fn test_factory_error_surfaces() {
        let result = TransferWorker::spawn::<ScriptedEngine, _>("xfer-test", || {
            Err(XferError::EngineSetup("no device".into()))
        });
        assert!(matches!(result, Err(XferError::EngineSetup(m)) if m == "no device"));
    }

    #[tokio::test]
    async fn test_close_error_reported_and_worker_stops() {
        let (engine, script) = ScriptedEngine::new();
        script.fail_close("handles leaked");
        let worker = TransferWorker::spawn("xfer-test", move || Ok(engine)).unwrap();

        assert!(matches!(worker.shutdown().await, Err(XferError::EngineClose(_))));
        assert!(matches!(
            worker.poll_completed_batch(Duration::ZERO).await,
            Err(XferError::WorkerUnavailable)
        ));
    }
}
