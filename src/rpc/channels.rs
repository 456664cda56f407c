//! Channel registry: one entry per logical connection to a peer.
//!
//! ```text
//!   get_or_create(dst) ──▶ [closed, connecting] ──mark_open──▶ [open]
//!                                   ▲                           │
//!                                   │ reconnect                 │ mark_closed
//!                                   │ (persistent only)         ▼
//!                                   └──────────────── removed / retained
//! ```
//!
//! Frames written to a channel that is not open yet wait in its FIFO and
//! are handed back by [`ChannelRegistry::mark_open`] in the order they
//! were queued.

use std::collections::VecDeque;

use log::{debug, info};

/// Opaque channel identifier, unique for the life of the registry.
pub type ChannelId = u32;

/// Read-only view of a channel, as surfaced by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub kind: String,
    pub info: String,
    pub dst: String,
    pub is_open: bool,
    pub is_persistent: bool,
    pub is_broadcast_enabled: bool,
}

struct Channel {
    id: ChannelId,
    kind: String,
    info: String,
    dst: String,
    open: bool,
    connecting: bool,
    persistent: bool,
    broadcast: bool,
    queued: VecDeque<Vec<u8>>,
}

impl Channel {
    fn snapshot(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            kind: self.kind.clone(),
            info: self.info.clone(),
            dst: self.dst.clone(),
            is_open: self.open,
            is_persistent: self.persistent,
            is_broadcast_enabled: self.broadcast,
        }
    }
}

/// Result of [`ChannelRegistry::get_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub channel: ChannelId,
    /// The transport must be asked to (re)connect this channel.
    pub needs_connect: bool,
}

/// What [`ChannelRegistry::mark_closed`] did with the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    Removed,
    Retained,
    Unknown,
}

/// Insertion-ordered set of channels.
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    next_id: ChannelId,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a channel that the transport layer already accepted.
    /// The channel starts open.
    pub fn add(
        &mut self,
        kind: &str,
        info: &str,
        dst: &str,
        persistent: bool,
        broadcast: bool,
    ) -> ChannelId {
        let id = self.insert(kind, info, dst, persistent, broadcast);
        if let Some(ch) = self.find_mut(id) {
            ch.open = true;
        }
        info!("RPC: channel {} added ({} {})", id, kind, info);
        id
    }

    /// Route to `dst`: reuse the channel already bound to it (open,
    /// connecting, or persistent and waiting to reconnect), otherwise
    /// create a closed outbound channel.
    pub fn get_or_create(&mut self, dst: &str) -> Route {
        if let Some(ch) = self.channels.iter_mut().find(|c| c.dst == dst) {
            let needs_connect = !ch.open && !ch.connecting;
            if needs_connect {
                ch.connecting = true;
            }
            return Route {
                channel: ch.id,
                needs_connect,
            };
        }

        let id = self.insert(outbound_kind(dst), dst, dst, false, false);
        if let Some(ch) = self.find_mut(id) {
            ch.connecting = true;
        }
        debug!("RPC: channel {} created for {}", id, dst);
        Route {
            channel: id,
            needs_connect: true,
        }
    }

    /// Mark a channel open and hand back the frames queued while it was
    /// connecting. Returns `None` for an unknown channel.
    pub fn mark_open(&mut self, id: ChannelId) -> Option<Vec<Vec<u8>>> {
        let ch = self.find_mut(id)?;
        ch.open = true;
        ch.connecting = false;
        info!("RPC: channel {} open ({})", id, ch.info);
        Some(ch.queued.drain(..).collect())
    }

    /// Mark a channel closed. Non-persistent channels are removed;
    /// persistent ones stay registered (closed) for reconnection.
    pub fn mark_closed(&mut self, id: ChannelId) -> Closed {
        let Some(pos) = self.channels.iter().position(|c| c.id == id) else {
            return Closed::Unknown;
        };

        if self.channels[pos].persistent {
            let ch = &mut self.channels[pos];
            ch.open = false;
            ch.connecting = false;
            ch.queued.clear();
            info!("RPC: channel {} closed, retained for reconnect", id);
            Closed::Retained
        } else {
            let ch = self.channels.remove(pos);
            info!("RPC: channel {} closed ({})", id, ch.info);
            Closed::Removed
        }
    }

    /// Queue a frame on a channel that is not open yet.
    pub fn enqueue(&mut self, id: ChannelId, frame: Vec<u8>) -> bool {
        match self.find_mut(id) {
            Some(ch) => {
                ch.queued.push_back(frame);
                true
            }
            None => false,
        }
    }

    pub fn set_persistent(&mut self, id: ChannelId, persistent: bool) {
        if let Some(ch) = self.find_mut(id) {
            ch.persistent = persistent;
        }
    }

    pub fn set_broadcast(&mut self, id: ChannelId, broadcast: bool) {
        if let Some(ch) = self.find_mut(id) {
            ch.broadcast = broadcast;
        }
    }

    pub fn is_open(&self, id: ChannelId) -> bool {
        self.find(id).is_some_and(|c| c.open)
    }

    pub fn get(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.find(id).map(Channel::snapshot)
    }

    /// Snapshots in insertion order.
    pub fn enumerate(&self) -> Vec<ChannelInfo> {
        self.channels.iter().map(Channel::snapshot).collect()
    }

    /// Open channels that take part in broadcast delivery.
    pub fn broadcast_targets(&self) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|c| c.broadcast && c.open)
            .map(|c| c.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    // ── Internal ──────────────────────────────────────────────

    fn insert(
        &mut self,
        kind: &str,
        info: &str,
        dst: &str,
        persistent: bool,
        broadcast: bool,
    ) -> ChannelId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.channels.push(Channel {
            id,
            kind: kind.to_owned(),
            info: info.to_owned(),
            dst: dst.to_owned(),
            open: false,
            connecting: false,
            persistent,
            broadcast,
            queued: VecDeque::new(),
        });
        id
    }

    fn find(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }
}

/// Transport kind label for an outbound destination, from its scheme.
fn outbound_kind(dst: &str) -> &'static str {
    match dst.split_once("://").map(|(scheme, _)| scheme) {
        Some("tcp") => "TCP_out",
        Some("ws" | "wss") => "WS_out",
        Some("udp") => "UDP_out",
        _ => "OUT",
    }
}
