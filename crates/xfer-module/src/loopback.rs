//! `LoopbackEngine`: in-process echo engine.
//!
//! Each scheduled transfer "completes" once its latency elapses:
//! - targets starting with `unreachable_prefix` fail with `ConnectionRefused`,
//! - a `total` timeout shorter than the latency fails with `Timeout`,
//! - everything else succeeds with the request body echoed back.
//!
//! Cancelled transfers are reported as a `Failure` on the next poll.
//! The engine is `!Send` on purpose: it stands in for a native library
//! whose state may only be touched from the thread that created it.

use xfer_core::engine::TransferEngine;
use xfer_core::entry::{RequestDescriptor, ResponseData, TransferHandle};
use xfer_core::error::{FailureCause, Result, XferError};
use xfer_core::CompletionRecord;

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Loopback engine configuration.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Time from schedule to completion.
    pub latency: Duration,
    /// Targets with this prefix are refused.
    pub unreachable_prefix: Option<String>,
    /// Status code of successful responses.
    pub status: u16,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(5),
            unreachable_prefix: Some("http://unreachable".into()),
            status: 200,
        }
    }
}

impl LoopbackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latency(mut self, d: Duration) -> Self {
        self.latency = d;
        self
    }

    pub fn unreachable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.unreachable_prefix = Some(prefix.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Echo,
    Refused,
    TimedOut,
}

struct Transfer {
    request: RequestDescriptor,
    due: Instant,
    fate: Fate,
}

pub struct LoopbackEngine {
    config: LoopbackConfig,
    next_handle: u64,
    inflight: HashMap<TransferHandle, Transfer>,
    /// Cancelled transfers waiting to be reported.
    aborted: VecDeque<CompletionRecord>,
    closed: bool,
    _thread_confined: PhantomData<Rc<()>>,
}

impl LoopbackEngine {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            next_handle: 1,
            inflight: HashMap::new(),
            aborted: VecDeque::new(),
            closed: false,
            _thread_confined: PhantomData,
        }
    }

    fn fate_of(&self, request: &RequestDescriptor) -> (Fate, Duration) {
        let refused = self
            .config
            .unreachable_prefix
            .as_deref()
            .is_some_and(|p| request.target().starts_with(p));
        if refused {
            return (Fate::Refused, self.config.latency);
        }
        match request.timeouts().total {
            Some(total) if total < self.config.latency => (Fate::TimedOut, total),
            _ => (Fate::Echo, self.config.latency),
        }
    }

    fn finish(&self, handle: TransferHandle, transfer: Transfer) -> CompletionRecord {
        match transfer.fate {
            Fate::Echo => {
                let response = ResponseData::new(self.config.status, transfer.request.body_bytes())
                    .with_header("x-loopback-handle", handle.as_raw().to_string());
                CompletionRecord::Success(transfer.request, response)
            }
            Fate::Refused => {
                let target = transfer.request.target().to_string();
                CompletionRecord::Failure(transfer.request, FailureCause::ConnectionRefused(target))
            }
            Fate::TimedOut => CompletionRecord::Failure(transfer.request, FailureCause::Timeout),
        }
    }

    fn earliest_due(&self) -> Option<Instant> {
        self.inflight.values().map(|t| t.due).min()
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl TransferEngine for LoopbackEngine {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn schedule(&mut self, request: RequestDescriptor) -> std::result::Result<TransferHandle, FailureCause> {
        if self.closed {
            return Err(FailureCause::Engine("loopback engine closed".into()));
        }
        let handle = TransferHandle::from_raw(self.next_handle);
        self.next_handle += 1;

        let (fate, delay) = self.fate_of(&request);
        tracing::trace!("loopback: {} -> {} ({:?} in {:?})", request.id(), handle, fate, delay);
        self.inflight.insert(
            handle,
            Transfer {
                request,
                due: Instant::now() + delay,
                fate,
            },
        );
        Ok(handle)
    }

    fn poll_completed(&mut self, timeout: Duration) -> Vec<CompletionRecord> {
        let now = Instant::now();
        if self.aborted.is_empty() {
            if let Some(due) = self.earliest_due() {
                let wake = due.min(now + timeout);
                if wake > now {
                    std::thread::sleep(wake - now);
                }
            }
        }

        let mut batch: Vec<CompletionRecord> = self.aborted.drain(..).collect();

        let now = Instant::now();
        let mut ready: Vec<(Instant, TransferHandle)> = self
            .inflight
            .iter()
            .filter(|(_, t)| t.due <= now)
            .map(|(h, t)| (t.due, *h))
            .collect();
        ready.sort_by_key(|(due, h)| (*due, h.as_raw()));

        for (_, handle) in ready {
            if let Some(transfer) = self.inflight.remove(&handle) {
                batch.push(self.finish(handle, transfer));
            }
        }
        batch
    }

    fn cancel(&mut self, handle: TransferHandle, cause: FailureCause) {
        match self.inflight.remove(&handle) {
            Some(transfer) => {
                tracing::trace!("loopback: abort {} ({})", handle, cause);
                self.aborted
                    .push_back(CompletionRecord::Failure(transfer.request, cause));
            }
            None => {
                tracing::debug!("loopback: cancel for finished or unknown {}", handle);
            }
        }
    }

    fn inflight(&self) -> usize {
        self.inflight.len() + self.aborted.len()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(XferError::EngineClose("loopback engine already closed".into()));
        }
        self.closed = true;
        let dropped = self.inflight.len() + self.aborted.len();
        if dropped > 0 {
            tracing::debug!("loopback: closing with {} unreported transfers", dropped);
        }
        self.inflight.clear();
        self.aborted.clear();
        Ok(())
    }
}
