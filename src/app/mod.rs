//! Application core: example methods and event handling, zero I/O.
//!
//! Interaction with the status LED and the peer links happens through
//! the port traits in [`ports`], keeping this layer testable without
//! sockets or hardware.

pub mod handlers;
pub mod ports;
pub mod service;

pub use service::{App, AppState};
