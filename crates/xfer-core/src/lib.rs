//! # xfer-core: Types and traits for the transfer processor
//!
//! This crate defines the vocabulary shared by every xfer component:
//! what a request looks like, what a completion looks like, and the
//! boundary to the native transfer engine that performs the actual I/O.
//!
//! ## Design principle
//!
//! > "The engine is a black box with four verbs: schedule, poll, cancel, close."
//!
//! Everything above the engine (the worker thread, the pending-result
//! registry, the public processor) depends only on the types and the
//! [`engine::TransferEngine`] trait from this crate. Swapping the engine
//! is a factory-closure change, nothing else moves.

pub mod entry;
pub mod completion;
pub mod engine;
pub mod error;
pub mod env;

pub use completion::CompletionRecord;
pub use engine::TransferEngine;
pub use entry::{RequestDescriptor, RequestId, ResponseData, TransferHandle};
pub use error::{FailureCause, Result, XferError};
