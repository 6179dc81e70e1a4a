//! Single-assignment result slots.
//!
//! [`pending()`] returns the two halves of one slot. The writer half
//! ([`PendingSlot`]) lives in the registry and is consumed by `resolve()`;
//! the reader half ([`PendingResult`]) stays with the waiting caller.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use xfer_core::entry::{RequestId, ResponseData};
use xfer_core::error::{FailureCause, Result, XferError};

/// Terminal outcome of one transfer.
pub type Outcome = std::result::Result<ResponseData, FailureCause>;

/// Writer half. Resolving consumes it, so a slot cannot be resolved twice.
#[derive(Debug)]
pub struct PendingSlot {
    id: RequestId,
    tx: oneshot::Sender<Outcome>,
}

/// Reader half. Yields the outcome once.
#[derive(Debug)]
pub struct PendingResult {
    id: RequestId,
    rx: Option<oneshot::Receiver<Outcome>>,
}

/// Create a fresh slot for `id`.
pub fn pending(id: RequestId) -> (PendingSlot, PendingResult) {
    let (tx, rx) = oneshot::channel();
    (PendingSlot { id, tx }, PendingResult { id, rx: Some(rx) })
}

impl PendingSlot {
    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Deliver the outcome. Returns `false` if the waiter already went away.
    pub fn resolve(self, outcome: Outcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

impl PendingResult {
    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Non-blocking check.
    ///
    /// `Ok(None)` while unresolved. Once the outcome has been taken, or if
    /// the writer was dropped unresolved, returns `Err(Abandoned)`.
    pub fn try_take(&mut self) -> Result<Option<Outcome>> {
        let rx = self.rx.as_mut().ok_or(XferError::Abandoned(self.id))?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Ok(Some(outcome))
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Err(XferError::Abandoned(self.id))
            }
        }
    }
}

impl Future for PendingResult {
    type Output = Result<Outcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(XferError::Abandoned(id)));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                self.rx = None;
                Poll::Ready(Ok(outcome))
            }
            Poll::Ready(Err(_)) => {
                self.rx = None;
                Poll::Ready(Err(XferError::Abandoned(id)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_core::RequestDescriptor;

    #[test]
    fn test_resolve_once_then_take() {
        let id = RequestDescriptor::get("x").id();
        let (slot, mut result) = pending(id);
        assert!(matches!(result.try_take(), Ok(None)));

        assert!(slot.resolve(Ok(ResponseData::new(204, ""))));
        let outcome = result.try_take().unwrap().unwrap();
        assert_eq!(outcome.unwrap().status, 204);

        // Taking twice is loud.
        assert!(matches!(result.try_take(), Err(XferError::Abandoned(i)) if i == id));
    }

    #[test]
    fn test_dropped_writer_is_abandoned() {
        let id = RequestDescriptor::get("x").id();
        let (slot, mut result) = pending(id);
        drop(slot);
        assert!(matches!(result.try_take(), Err(XferError::Abandoned(_))));
    }

    #[test]
    fn test_resolve_after_reader_dropped() {
        let (slot, result) = pending(RequestDescriptor::get("x").id());
        drop(result);
        assert!(!slot.resolve(Err(FailureCause::Timeout)));
    }

    #[tokio::test]
    async fn test_await_failure() {
        let (slot, result) = pending(RequestDescriptor::get("x").id());
        tokio::spawn(async move {
            slot.resolve(Err(FailureCause::Cancelled("t".into())));
        });
        let outcome = result.await.unwrap();
        assert!(matches!(outcome, Err(c) if c.is_cancelled()));
    }
}
