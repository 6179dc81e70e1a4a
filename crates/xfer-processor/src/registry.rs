//! Pending-result registry with an exact active count.
//!
//! Entries are spread over `SHARDS` independent maps, each behind its own
//! short-lived mutex, so concurrent callers registering and resolving
//! different requests rarely meet on the same lock. Shard choice is the
//! low bits of the request id (ids are sequential, so this spreads evenly).
//!
//! The active count is adjusted while the owning shard lock is held,
//! so right after any mutation it equals the number of entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use xfer_core::completion::CompletionRecord;
use xfer_core::entry::RequestId;
use xfer_core::error::{Result, XferError};

use crate::pending::{pending, PendingResult, PendingSlot};

const SHARDS: usize = 64;

/// Per-batch resolution summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records delivered to a pending slot.
    pub resolved: usize,
    /// Records with no pending entry.
    pub orphaned: usize,
}

pub struct PendingRegistry {
    shards: Box<[Mutex<HashMap<RequestId, PendingSlot>>]>,
    active: AtomicUsize,
}

impl PendingRegistry {
    pub fn new() -> Self {
        let shards = (0..SHARDS)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            active: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn shard(&self, id: RequestId) -> &Mutex<HashMap<RequestId, PendingSlot>> {
        &self.shards[(id.as_u64() as usize) % SHARDS]
    }

    /// Insert a fresh slot for `id` and hand back its reader half.
    ///
    /// Fails with `DuplicateRequest` if `id` is already in flight.
    pub fn register(&self, id: RequestId) -> Result<PendingResult> {
        let mut shard = self.shard(id).lock();
        if shard.contains_key(&id) {
            return Err(XferError::DuplicateRequest(id));
        }
        let (slot, result) = pending(id);
        shard.insert(id, slot);
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(result)
    }

    /// Resolve the slot matching `record`, removing its entry.
    ///
    /// Fails with `UnknownRequest` if there is no entry, which is the case
    /// for a record delivered twice or for a caller that already left.
    pub fn resolve_and_remove(&self, record: CompletionRecord) -> Result<RequestId> {
        let id = record.id();
        let slot = {
            let mut shard = self.shard(id).lock();
            let slot = shard.remove(&id).ok_or(XferError::UnknownRequest(id))?;
            self.active.fetch_sub(1, Ordering::AcqRel);
            slot
        };
        let (_, outcome) = record.into_outcome();
        if !slot.resolve(outcome) {
            tracing::debug!("{}: waiter gone before resolution", id);
        }
        Ok(id)
    }

    /// Resolve every record of one poll batch, in batch order.
    pub fn resolve_batch(&self, batch: Vec<CompletionRecord>) -> BatchOutcome {
        let mut out = BatchOutcome::default();
        for record in batch {
            match self.resolve_and_remove(record) {
                Ok(id) => {
                    tracing::debug!("{}: resolved", id);
                    out.resolved += 1;
                }
                Err(e) => {
                    tracing::warn!("orphaned completion record: {}", e);
                    out.orphaned += 1;
                }
            }
        }
        out
    }

    /// Drop the entry for `id` without resolving it. Returns whether it existed.
    pub fn remove(&self, id: RequestId) -> bool {
        let mut shard = self.shard(id).lock();
        let removed = shard.remove(&id).is_some();
        if removed {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.shard(id).lock().contains_key(&id)
    }

    /// Active-count tracker value.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Entry count, summed shard by shard. Exact only when quiescent.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xfer_core::error::FailureCause;
    use xfer_core::{RequestDescriptor, ResponseData};

    fn ok(req: &RequestDescriptor) -> CompletionRecord {
        CompletionRecord::Success(req.clone(), ResponseData::new(200, "ok"))
    }

    #[test]
    fn test_register_resolve_remove() {
        let reg = PendingRegistry::new();
        let req = RequestDescriptor::get("http://a/");
        let mut result = reg.register(req.id()).unwrap();
        assert_eq!(reg.active_count(), 1);
        assert!(reg.contains(req.id()));

        assert_eq!(reg.resolve_and_remove(ok(&req)).unwrap(), req.id());
        assert_eq!(reg.active_count(), 0);
        assert!(reg.is_empty());

        let outcome = result.try_take().unwrap().unwrap();
        assert_eq!(outcome.unwrap().body, b"ok");
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let reg = PendingRegistry::new();
        let req = RequestDescriptor::get("http://a/");
        let _r = reg.register(req.id()).unwrap();
        assert!(matches!(
            reg.register(req.clone().id()),
            Err(XferError::DuplicateRequest(id)) if id == req.id()
        ));
        assert_eq!(reg.active_count(), 1);
    }

    #[test]
    fn test_second_resolution_is_detected() {
        let reg = PendingRegistry::new();
        let req = RequestDescriptor::get("http://a/");
        let _r = reg.register(req.id()).unwrap();

        reg.resolve_and_remove(ok(&req)).unwrap();
        let second = reg.resolve_and_remove(CompletionRecord::Failure(req.clone(), FailureCause::Timeout));
        assert!(matches!(second, Err(XferError::UnknownRequest(id)) if id == req.id()));
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn test_batch_counts_orphans() {
        let reg = PendingRegistry::new();
        let a = RequestDescriptor::get("http://a/");
        let b = RequestDescriptor::get("http://b/");
        let stray = RequestDescriptor::get("http://stray/");
        let _ra = reg.register(a.id()).unwrap();
        let _rb = reg.register(b.id()).unwrap();

        let out = reg.resolve_batch(vec![ok(&b), ok(&stray), ok(&a)]);
        assert_eq!(out, BatchOutcome { resolved: 2, orphaned: 1 });
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn test_remove_without_resolution() {
        let reg = PendingRegistry::new();
        let req = RequestDescriptor::get("http://a/");
        let mut result = reg.register(req.id()).unwrap();
        assert!(reg.remove(req.id()));
        assert!(!reg.remove(req.id()));
        assert_eq!(reg.active_count(), 0);
        assert!(matches!(result.try_take(), Err(XferError::Abandoned(_))));
    }

    #[test]
    fn test_concurrent_count_matches_len() {
        let reg = Arc::new(PendingRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..200 {
                        let req = RequestDescriptor::get("http://x/");
                        let result = reg.register(req.id()).unwrap();
                        if i % 3 == 0 {
                            kept.push(result);
                        } else {
                            reg.resolve_and_remove(CompletionRecord::Success(
                                req,
                                ResponseData::default(),
                            ))
                            .unwrap();
                        }
                    }
                    kept.len()
                })
            })
            .collect();

        let kept: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(reg.active_count(), kept);
        assert_eq!(reg.len(), kept);
    }
}
