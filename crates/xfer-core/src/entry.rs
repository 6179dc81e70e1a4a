//! Request and response entry types.
//!
//! These are the *lingua franca* between all xfer components. A
//! [`RequestDescriptor`] crosses the thread boundary into the worker by
//! value; nothing in it is mutable once built.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one logical request.
///
/// Assigned once when the descriptor is built. Two descriptors are the
/// same request iff their ids are equal, regardless of their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Opaque handle returned by the engine when a request is scheduled.
///
/// Only meaningful to the engine that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TransferHandle(u64);

impl TransferHandle {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xh#{}", self.0)
    }
}

/// Per-request timeouts, enforced by the engine (not by the processor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub total: Option<Duration>,
}

/// Immutable description of one logical transfer.
///
/// Built with the consuming builder methods below, then handed to the
/// processor by value. Equality and hashing use [`RequestId`] only.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    id: RequestId,
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Arc<[u8]>,
    timeouts: Timeouts,
}

impl RequestDescriptor {
    /// Create a descriptor with a fresh identity and an empty body.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: RequestId::next(),
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: Arc::from(Vec::<u8>::new()),
            timeouts: Timeouts::default(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new("GET", target)
    }

    pub fn post(target: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new("POST", target).body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body: Vec<u8> = body.into();
        self.body = Arc::from(body);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = Some(timeout);
        self
    }

    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.total = Some(timeout);
        self
    }

    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up the first header with the given name (ASCII case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

impl PartialEq for RequestDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RequestDescriptor {}

impl std::hash::Hash for RequestDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// What the engine produced for a successful transfer.
///
/// Interpretation of the body is the caller's business.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseData {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponseData {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
