//! TCP link adapter.
//!
//! Implements [`Transport`] and [`LinkPort`] over plain `std::net` TCP
//! with the 4-byte length-prefix framing from [`crate::rpc::codec`].
//!
//! ## Threading
//!
//! Blocking socket work happens on helper threads that only post
//! [`TransportEvent`]s to the event queue. They use the waiting
//! [`EventQueue::send`], so a full queue stalls the thread instead of
//! losing the event:
//!
//! 1. The accept thread posts `Accepted` for every inbound connection.
//! 2. A connect thread per outbound request posts `Connected` or
//!    `ConnectFailed`.
//! 3. A reader thread per channel decodes frames and posts `Frame`, then
//!    `Closed` when the peer hangs up.
//!
//! Writes happen on the dispatch thread through [`Transport::send`].
//!
//! ## Channels
//!
//! | Kind      | Created by             | persistent | broadcast |
//! |-----------|------------------------|------------|-----------|
//! | `TCP_in`  | listener accept        | no         | yes       |
//! | `TCP_out` | `tcp://host:port` call | no         | no        |

use core::fmt;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;

use log::{debug, info, warn};

use crate::app::ports::LinkPort;
use crate::events::{Event, EventQueue, FrameBuf, TransportEvent};
use crate::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE, encode_frame};
use crate::rpc::{ChannelId, Dispatcher, Transport};

const READ_CHUNK: usize = 1024;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LinkError {
    /// Destination is not a `tcp://host:port` address.
    Unsupported(String),
    /// No open socket for this channel.
    NotConnected(ChannelId),
    /// Frame is empty or exceeds [`MAX_FRAME_SIZE`].
    FrameSize(usize),
    Io(io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(dst) => write!(f, "unsupported destination {dst}"),
            Self::NotConnected(ch) => write!(f, "channel {ch} not connected"),
            Self::FrameSize(n) => write!(f, "frame of {n} bytes not sendable"),
            Self::Io(e) => write!(f, "I/O: {e}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// `tcp://host:port` → `host:port`.
pub fn tcp_authority(dst: &str) -> Option<&str> {
    dst.strip_prefix("tcp://")
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|a| !a.is_empty())
}

// ───────────────────────────────────────────────────────────────
// TcpLinks
// ───────────────────────────────────────────────────────────────

pub struct TcpLinks {
    events: &'static EventQueue,
    /// Write halves of open channels.
    streams: HashMap<ChannelId, TcpStream>,
}

impl TcpLinks {
    pub fn new(events: &'static EventQueue) -> Self {
        Self {
            events,
            streams: HashMap::new(),
        }
    }

    /// Bind `addr` and start the accept thread. Returns the bound address.
    pub fn listen(&self, addr: &str) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr)?;
        let local = listener.local_addr()?;
        let events = self.events;
        thread::Builder::new()
            .name("tcp-accept".into())
            .spawn(move || accept_loop(&listener, events))?;
        info!("TCP: listening on {}", local);
        Ok(local)
    }

    pub fn open_count(&self) -> usize {
        self.streams.len()
    }

    /// Keep the write half of `stream` for `channel` and start its reader.
    fn attach(&mut self, channel: ChannelId, stream: TcpStream) -> io::Result<()> {
        let reader = stream.try_clone()?;
        let events = self.events;
        thread::Builder::new()
            .name(format!("tcp-rx-{channel}"))
            .spawn(move || read_loop(channel, reader, events))?;
        self.streams.insert(channel, stream);
        Ok(())
    }
}

impl Transport for TcpLinks {
    type Error = LinkError;

    fn connect(&mut self, channel: ChannelId, dst: &str) -> Result<(), LinkError> {
        let authority = tcp_authority(dst)
            .ok_or_else(|| LinkError::Unsupported(dst.to_owned()))?
            .to_owned();
        let events = self.events;
        thread::Builder::new()
            .name(format!("tcp-connect-{channel}"))
            .spawn(move || {
                let ev = match connect_to(&authority) {
                    Ok(stream) => TransportEvent::Connected { channel, stream },
                    Err(e) => TransportEvent::ConnectFailed {
                        channel,
                        reason: format!("{authority}: {e}"),
                    },
                };
                events.send(Event::Transport(ev));
            })?;
        debug!("TCP[{}]: connecting to {}", channel, dst);
        Ok(())
    }

    fn send(&mut self, channel: ChannelId, frame: &[u8]) -> Result<(), LinkError> {
        let stream = self
            .streams
            .get_mut(&channel)
            .ok_or(LinkError::NotConnected(channel))?;
        let bytes = encode_frame(frame).ok_or(LinkError::FrameSize(frame.len()))?;
        stream.write_all(&bytes)?;
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) {
        if let Some(stream) = self.streams.remove(&channel) {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("TCP[{}]: closed", channel);
        }
    }
}

impl LinkPort for TcpLinks {
    fn on_transport_event(&mut self, event: TransportEvent, rpc: &mut Dispatcher) {
        match event {
            TransportEvent::Accepted { stream, peer } => {
                let channel = rpc.channel_connected("TCP_in", &peer.to_string(), "", false, true);
                if let Err(e) = self.attach(channel, stream) {
                    warn!("TCP[{}]: reader not started: {}", channel, e);
                    rpc.channel_closed(channel);
                }
            }
            TransportEvent::Connected { channel, stream } => {
                if rpc.channels().get(channel).is_none() {
                    debug!("TCP[{}]: connected after channel was dropped", channel);
                    let _ = stream.shutdown(Shutdown::Both);
                    return;
                }
                match self.attach(channel, stream) {
                    Ok(()) => rpc.channel_opened(channel),
                    Err(e) => {
                        warn!("TCP[{}]: reader not started: {}", channel, e);
                        rpc.channel_closed(channel);
                    }
                }
            }
            TransportEvent::ConnectFailed { channel, reason } => {
                warn!("TCP[{}]: connect failed: {}", channel, reason);
                rpc.channel_closed(channel);
            }
            TransportEvent::Frame { channel, data } => rpc.handle_frame(channel, &data),
            TransportEvent::Closed { channel } => {
                self.close(channel);
                rpc.channel_closed(channel);
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Helper threads
// ───────────────────────────────────────────────────────────────

fn connect_to(authority: &str) -> io::Result<TcpStream> {
    let mut last = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
    for addr in authority.to_socket_addrs()? {
        match TcpStream::connect(addr) {
            Ok(s) => {
                let _ = s.set_nodelay(true);
                return Ok(s);
            }
            Err(e) => last = e,
        }
    }
    Err(last)
}

fn accept_loop(listener: &TcpListener, events: &'static EventQueue) {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let peer = match stream.peer_addr() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("TCP: accepted socket without peer address: {}", e);
                        continue;
                    }
                };
                let _ = stream.set_nodelay(true);
                info!("TCP: accepted {}", peer);
                events.send(Event::Transport(TransportEvent::Accepted { stream, peer }));
            }
            Err(e) => warn!("TCP: accept failed: {}", e),
        }
    }
}

fn read_loop(channel: ChannelId, mut stream: TcpStream, events: &'static EventQueue) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                decoder.feed(&buf[..n], |frame| {
                    let mut data = FrameBuf::new();
                    if data.extend_from_slice(frame).is_ok() {
                        events.send(Event::Transport(TransportEvent::Frame { channel, data }));
                    } else {
                        warn!("TCP[{}]: frame over {} bytes dropped", channel, MAX_FRAME_SIZE);
                    }
                });
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("TCP[{}]: read ended: {}", channel, e);
                break;
            }
        }
    }
    events.send(Event::Transport(TransportEvent::Closed { channel }));
}
