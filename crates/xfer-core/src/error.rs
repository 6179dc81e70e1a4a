//! xfer error types.

use crate::entry::RequestId;

/// Why a single transfer did not succeed.
///
/// Produced by the engine inside a [`crate::CompletionRecord::Failure`],
/// or by the processor when it asks the engine to abort.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    /// The peer refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    /// An engine-enforced timeout fired.
    #[error("transfer timed out")]
    Timeout,
    /// The peer spoke something the engine could not parse.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The transfer was aborted on request.
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// Any other engine-reported failure.
    #[error("engine error: {0}")]
    Engine(String),
}

impl FailureCause {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum XferError {
    /// The engine reported a terminal failure for this request.
    #[error("transfer failed: {0}")]
    Transfer(#[from] FailureCause),
    /// The worker thread is gone (processor closed).
    #[error("transfer worker unavailable")]
    WorkerUnavailable,
    /// A request with the same identity is already in flight.
    #[error("{0} is already in flight")]
    DuplicateRequest(RequestId),
    /// No pending result exists for this request (already resolved or never registered).
    #[error("no pending result for {0}")]
    UnknownRequest(RequestId),
    /// The pending result was dropped without being resolved.
    #[error("pending result for {0} dropped unresolved")]
    Abandoned(RequestId),
    /// The engine factory failed, or the worker died during startup.
    #[error("engine setup failed: {0}")]
    EngineSetup(String),
    /// The engine reported an error while releasing its resources.
    #[error("engine close failed: {0}")]
    EngineClose(String),
    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),
}

impl XferError {
    /// The failure cause, if this is a per-request transfer failure.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Transfer(cause) => Some(cause),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some_and(FailureCause::is_cancelled)
    }
}

pub type Result<T> = std::result::Result<T, XferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = XferError::Transfer(FailureCause::ConnectionRefused("10.0.0.1:80".into()));
        assert_eq!(e.to_string(), "transfer failed: connection refused: 10.0.0.1:80");
        assert_eq!(XferError::WorkerUnavailable.to_string(), "transfer worker unavailable");
    }

    #[test]
    fn test_cancel_classification() {
        let e: XferError = FailureCause::Cancelled("by caller".into()).into();
        assert!(e.is_cancelled());
        assert!(!XferError::WorkerUnavailable.is_cancelled());
        assert!(!XferError::from(FailureCause::Timeout).is_cancelled());
    }
}
