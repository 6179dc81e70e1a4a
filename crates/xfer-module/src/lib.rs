//! # xfer-module: Default engine implementations
//!
//! Every engine here implements [`xfer_core::TransferEngine`] and is
//! meant to be built on the transfer worker thread.
//!
//! | Engine           | Purpose                                      |
//! |------------------|----------------------------------------------|
//! | `LoopbackEngine` | echo engine with latency, for smoke runs     |
//! | `ScriptedEngine` | completions pushed by a test, deterministic  |

pub mod loopback;
pub mod scripted;

pub use loopback::{LoopbackConfig, LoopbackEngine};
pub use scripted::{ScriptHandle, ScriptedEngine};
