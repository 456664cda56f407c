//! Transport-agnostic RPC subsystem.
//!
//! JSON request/response frames routed by name, with outbound calls
//! correlated back to their callbacks by id.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        RPC Stack                           │
//! │                                                            │
//! │  ┌───────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │ Transport │──▶│  Codec   │──▶│ Dispatcher            │  │
//! │  │ (trait)   │   │ (framing)│   │  registry ─▶ handlers │  │
//! │  └───────────┘   └──────────┘   │  pending  ─▶ callbacks│  │
//! │       ▲                         └───────────┬───────────┘  │
//! │       │        Outbound (Connect / Send)    │              │
//! │       └─────────────────────────────────────┘              │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod codec;
pub mod engine;
pub mod frame;
pub mod pending;
pub mod registry;
pub mod transport;

pub use channels::{ChannelId, ChannelInfo};
pub use engine::{Dispatcher, DispatcherConfig, RequestContext};
pub use pending::{CallResult, CallState};
pub use registry::{Handler, typed};
pub use transport::{Outbound, Transport};
