//! Completion records.
//!
//! A `CompletionRecord` is the terminal outcome of one request, produced
//! only by the engine's poll operation and delivered at most once per
//! [`RequestDescriptor`].

use crate::entry::{RequestDescriptor, RequestId, ResponseData};
use crate::error::FailureCause;

#[derive(Debug, Clone)]
pub enum CompletionRecord {
    Success(RequestDescriptor, ResponseData),
    Failure(RequestDescriptor, FailureCause),
}

impl CompletionRecord {
    #[inline]
    pub fn request(&self) -> &RequestDescriptor {
        match self {
            Self::Success(req, _) | Self::Failure(req, _) => req,
        }
    }

    #[inline]
    pub fn id(&self) -> RequestId {
        self.request().id()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(..))
    }

    /// Split into the request and its outcome.
    pub fn into_outcome(self) -> (RequestDescriptor, Result<ResponseData, FailureCause>) {
        match self {
            Self::Success(req, resp) => (req, Ok(resp)),
            Self::Failure(req, cause) => (req, Err(cause)),
        }
    }
}
