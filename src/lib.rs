//! peerlink: bidirectional RPC dispatch core.
//!
//! Exposes the dispatcher, its registries and the example application
//! for integration testing. The binary in `main.rs` wires them to TCP,
//! stdin and a timer thread.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod events;
pub mod rpc;
pub mod scheduler;

pub use error::{CallError, RpcError};
