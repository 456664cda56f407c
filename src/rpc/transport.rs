//! Transport abstraction: whatever actually moves frames to peers.
//!
//! The dispatcher never owns a transport. It queues [`Outbound`] actions
//! and [`Dispatcher::flush_to`](super::engine::Dispatcher::flush_to)
//! hands them to a `Transport`. Connection completions and inbound frames
//! come back to the dispatcher through its `channel_*` and
//! `handle_frame` entry points, always on the dispatch thread.

use super::channels::ChannelId;

/// Action the dispatcher wants the transport layer to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Open a connection for `channel` to `dst`. Completion is reported
    /// later through `Dispatcher::channel_opened` / `channel_closed`.
    Connect { channel: ChannelId, dst: String },
    /// Write one encoded frame (JSON bytes, unframed) to an open channel.
    Send { channel: ChannelId, frame: Vec<u8> },
}

/// Frame-oriented transport.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Start connecting `channel` to `dst`. Must not block on the
    /// connection itself.
    fn connect(&mut self, channel: ChannelId, dst: &str) -> Result<(), Self::Error>;

    /// Write one frame to an open channel.
    fn send(&mut self, channel: ChannelId, frame: &[u8]) -> Result<(), Self::Error>;

    /// Tear down a channel's connection, if any.
    fn close(&mut self, channel: ChannelId);
}
