//! # xfer-processor: Many async callers, one engine thread
//!
//! Bridges a single-threaded transfer engine to any number of concurrent
//! tokio tasks. The engine lives on one dedicated OS thread; everything
//! else talks to it by message.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Caller tasks (any number, any runtime thread)   │
//! │   processor.execute_request(req, &token).await           │
//! └──────────────────┬──────────────────────────────────────┘
//!                    │ register → schedule → poll loop
//!                    ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │         Processor                                        │
//! │   PendingRegistry: RequestId → PendingSlot (sharded)     │
//! │   active count == registry size                          │
//! │   each waiter: poll batch → resolve all → sleep          │
//! └──────────────────┬──────────────────────────────────────┘
//!                    │ Command over MPSC, reply over oneshot
//! ┌──────────────────▼──────────────────────────────────────┐
//! │         Transfer worker (dedicated OS thread)            │
//! │   owns TransferEngine: schedule / poll / cancel / close  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use xfer_core::RequestDescriptor;
//! use xfer_module::LoopbackEngine;
//! use xfer_processor::{Processor, ProcessorConfig};
//!
//! let processor = Processor::start(ProcessorConfig::from_env(), || {
//!     Ok(LoopbackEngine::default())
//! })?;
//!
//! let token = CancellationToken::new();
//! let resp = processor
//!     .execute_request(RequestDescriptor::get("http://peer/"), &token)
//!     .await?;
//!
//! processor.close().await?;
//! ```
//!
//! ## Design Decisions
//!
//! - **Engine built on the worker**: the factory is `Send`, the engine
//!   need not be. No thread-affine globals.
//! - **Per-caller poll loop**: every waiter drives polls itself; whoever
//!   receives a batch resolves every record in it.
//! - **Single-assignment slots**: a `PendingSlot` is consumed by
//!   `resolve()`, so resolving twice does not compile.
//! - **RAII registration**: dropping a waiting caller removes its entry
//!   and asks the engine to abort its transfer.

pub mod config;
pub mod pending;
pub mod registry;
pub mod stats;
pub mod worker;
pub mod processor;

pub use config::ProcessorConfig;
pub use pending::{pending, PendingResult, PendingSlot};
pub use processor::Processor;
pub use registry::PendingRegistry;
pub use stats::ProcessorStats;
pub use worker::TransferWorker;
