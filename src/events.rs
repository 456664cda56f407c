//! Event queue feeding the dispatch loop.
//!
//! Events are produced by:
//! - the button reader (raw press edges)
//! - the network layer (IP acquired)
//! - the ticker thread (channel info, timeout sweep)
//! - TCP reader threads (accepted connections, frames, disconnects)
//!
//! and consumed one at a time by the dispatch loop, which owns the
//! dispatcher. Nothing else touches RPC state.
//!
//! Ticks and button edges go through [`EventQueue::push`] and are dropped
//! when the queue is full. Transport threads use [`EventQueue::send`] and
//! wait for room, so frames and connection changes always arrive.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Button      │────▶│              │     │              │
//! │ Ticker      │────▶│  EventQueue  │────▶│ Dispatch loop│
//! │ Net         │────▶│  (bounded)   │     │  (consumer)  │
//! │ TCP readers │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use std::net::{IpAddr, SocketAddr, TcpStream};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{debug, warn};

use crate::rpc::ChannelId;
use crate::rpc::codec::MAX_FRAME_SIZE;
use crate::scheduler::{TickDelegate, TickKind};

/// Maximum number of pending events.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// One decoded frame as carried through the queue.
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_SIZE>;

#[derive(Debug)]
pub enum Event {
    // ── User input ────────────────────────────────────────
    /// Raw button edge at `at_ms` (monotonic). Debounced by the app.
    ButtonPressed { at_ms: u64 },

    // ── Network ───────────────────────────────────────────
    Net(NetEvent),

    // ── Timers ────────────────────────────────────────────
    /// Periodic channel diagnostics.
    ChannelInfoTick,
    /// Check pending calls against the call timeout.
    TimeoutSweep,

    // ── Transport ─────────────────────────────────────────
    Transport(TransportEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    /// An interface came up with an address.
    IpAcquired(IpAddr),
}

/// Connection activity reported by transport threads.
#[derive(Debug)]
pub enum TransportEvent {
    /// A peer connected to the listener.
    Accepted { stream: TcpStream, peer: SocketAddr },
    /// An outbound connection requested for `channel` succeeded.
    Connected { channel: ChannelId, stream: TcpStream },
    ConnectFailed { channel: ChannelId, reason: String },
    /// One complete frame read from `channel`.
    Frame { channel: ChannelId, data: FrameBuf },
    /// The peer hung up or the read failed.
    Closed { channel: ChannelId },
}

impl Event {
    /// Short name for logs; frame payloads are never printed.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ButtonPressed { .. } => "ButtonPressed",
            Self::Net(_) => "Net",
            Self::ChannelInfoTick => "ChannelInfoTick",
            Self::TimeoutSweep => "TimeoutSweep",
            Self::Transport(TransportEvent::Accepted { .. }) => "Transport.Accepted",
            Self::Transport(TransportEvent::Connected { .. }) => "Transport.Connected",
            Self::Transport(TransportEvent::ConnectFailed { .. }) => "Transport.ConnectFailed",
            Self::Transport(TransportEvent::Frame { .. }) => "Transport.Frame",
            Self::Transport(TransportEvent::Closed { .. }) => "Transport.Closed",
        }
    }
}

impl From<TickKind> for Event {
    fn from(kind: TickKind) -> Self {
        match kind {
            TickKind::ChannelInfo => Self::ChannelInfoTick,
            TickKind::TimeoutSweep => Self::TimeoutSweep,
        }
    }
}

/// Bounded multi-producer queue. Safe to share as a `static`.
pub struct EventQueue {
    inner: Channel<CriticalSectionRawMutex, Event, EVENT_QUEUE_DEPTH>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            inner: Channel::new(),
        }
    }

    /// Enqueue without blocking. Returns `false` if the queue is full
    /// (event dropped).
    pub fn push(&self, event: Event) -> bool {
        match self.inner.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Events: queue full, dropping {}", event.label());
                false
            }
        }
    }

    /// Enqueue, parking the calling thread until there is room.
    /// For producers on their own thread whose events must not be lost
    /// (transport completions); never call from the dispatch thread.
    pub fn send(&self, event: Event) {
        if self.inner.is_full() {
            debug!("Events: queue full, waiting to post {}", event.label());
        }
        futures_lite::future::block_on(self.inner.send(event));
    }

    pub fn pop(&self) -> Option<Event> {
        self.inner.try_receive().ok()
    }

    /// Wait for the next event.
    pub async fn next(&self) -> Event {
        self.inner.receive().await
    }

    /// Deliver every pending event in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl TickDelegate for &EventQueue {
    fn on_tick(&mut self, kind: TickKind) {
        self.push(Event::from(kind));
    }
}
