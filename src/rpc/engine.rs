//! RPC engine. Routes inbound requests to handlers and correlates
//! outbound calls with their responses.
//!
//! **Transport-decoupled**: the engine does not own a transport. Callers
//! feed `(channel, frame_bytes)` via [`Dispatcher::handle_frame`] and
//! report connection changes via the `channel_*` methods; everything the
//! engine wants written or connected is queued as [`Outbound`] and drained
//! with [`Dispatcher::flush_to`] or [`Dispatcher::poll_outbound`].
//!
//! Outbound call lifecycle:
//!
//! ```text
//!   call() ──▶ Sent ──(channel open)──▶ AwaitingResponse ──▶ Completed
//!    │                                        │          └─▶ Failed(code, msg)
//!    │ no dst, no default peer                ├─(channel closed)──▶ Abandoned
//!    ▼                                        └─(sweep)───────────▶ TimedOut
//!  NoPeerConfigured (callback runs synchronously)
//! ```
//!
//! All state lives on the dispatch thread; nothing here is `Sync`.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::channels::{ChannelId, ChannelInfo, ChannelRegistry, Closed};
use super::frame::{Frame, FrameKind};
use super::pending::{CallResult, CallState, PendingCall, PendingCalls};
use super::registry::{Handler, MethodEntry, MethodRegistry, typed};
use super::transport::{Outbound, Transport};
use crate::error::{CallError, RpcError};

/// Construction-time settings for a [`Dispatcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Written as `src` on every frame this process sends.
    pub local_id: String,
    /// Destination used by [`Dispatcher::call`] when none is given.
    pub default_peer: Option<String>,
    /// Age after which [`Dispatcher::sweep_timeouts`] fails a call.
    /// `None` disables the sweep.
    pub call_timeout: Option<Duration>,
}

/// One inbound request, owned by its handler until answered.
///
/// Answering consumes the context, so a request can be answered at most
/// once. Dropping it unanswered is logged as a handler bug.
#[derive(Debug)]
pub struct RequestContext {
    channel: ChannelId,
    id: Option<u64>,
    src: String,
    method: String,
    answered: bool,
}

impl RequestContext {
    fn new(channel: ChannelId, id: Option<u64>, src: String, method: String) -> Self {
        Self {
            channel,
            id,
            src,
            method,
            answered: false,
        }
    }

    /// Channel the request arrived on; the response goes back there.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Requests without an id expect no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.answered && !self.is_notification() {
            warn!(
                "RPC[{}]: handler for {} dropped request {:?} without responding",
                self.channel, self.method, self.id
            );
        }
    }
}

#[derive(Deserialize)]
struct DescribeArgs {
    name: String,
}

/// Method registry, channel registry and correlation table in one place.
pub struct Dispatcher {
    config: DispatcherConfig,
    methods: MethodRegistry,
    channels: ChannelRegistry,
    pending: PendingCalls,
    outbound: VecDeque<Outbound>,
}

impl Dispatcher {
    /// Build a dispatcher with the built-in `RPC.*` methods registered.
    pub fn new(config: DispatcherConfig) -> Self {
        let mut rpc = Self {
            config,
            methods: MethodRegistry::new(),
            channels: ChannelRegistry::new(),
            pending: PendingCalls::new(),
            outbound: VecDeque::new(),
        };
        rpc.register_builtins();
        rpc
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains(id)
    }

    /// State of an outstanding call, `None` once it has completed.
    pub fn call_state(&self, id: u64) -> Option<CallState> {
        self.pending.get(id).map(|c| c.state)
    }

    // ── Registration ──────────────────────────────────────────

    /// Register a method whose arguments decode into `A`.
    pub fn register<A, F>(&mut self, name: &str, arg_shape: &str, handler: F) -> Result<(), RpcError>
    where
        A: DeserializeOwned + 'static,
        F: Fn(&mut Dispatcher, RequestContext, A) + 'static,
    {
        self.register_handler(name, arg_shape, typed(handler))
    }

    pub fn register_handler(
        &mut self,
        name: &str,
        arg_shape: &str,
        handler: Rc<dyn Handler>,
    ) -> Result<(), RpcError> {
        self.methods.register(name, arg_shape, handler)?;
        info!("RPC: registered {} {}", name, arg_shape);
        Ok(())
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Process one complete frame received on `channel`.
    pub fn handle_frame(&mut self, channel: ChannelId, data: &[u8]) {
        let frame = match Frame::parse(data) {
            Ok(f) => f,
            Err(e) => {
                warn!("RPC[{}]: invalid frame: {}", channel, e);
                return;
            }
        };

        match frame.kind() {
            FrameKind::Request => self.dispatch_request(channel, frame),
            FrameKind::Response => self.complete_call(frame),
            FrameKind::Invalid => warn!("RPC[{}]: frame has neither method nor id", channel),
        }
    }

    fn dispatch_request(&mut self, channel: ChannelId, mut frame: Frame) {
        let method = frame.method.take().unwrap_or_default();
        let args = frame.take_args();
        let req = RequestContext::new(channel, frame.id, frame.src, method);

        let handler = match self.methods.lookup(req.method()).map(MethodEntry::handler) {
            Ok(h) => h,
            Err(e) => {
                warn!("RPC[{}]: {}", channel, e);
                self.respond_error(req, &e);
                return;
            }
        };

        debug!("RPC[{}]: {} (id {:?})", channel, req.method(), req.id());
        handler.invoke(self, req, args);
    }

    fn complete_call(&mut self, frame: Frame) {
        let Some(id) = frame.id else {
            return;
        };
        let Some(call) = self.pending.take(id) else {
            debug!("RPC: dropping response for unknown id {}", id);
            return;
        };

        let outcome = frame.into_outcome();
        match &outcome {
            Ok(_) => debug!("RPC: {} (id {}) completed", call.method, id),
            Err(e) => info!("RPC: {} (id {}) failed: {}", call.method, id, e),
        }
        (call.callback)(self, outcome);
    }

    // ── Responses ─────────────────────────────────────────────

    pub fn respond(&mut self, req: RequestContext, result: Value) {
        self.respond_with(req, Ok(result));
    }

    pub fn respond_error(&mut self, req: RequestContext, err: &RpcError) {
        self.respond_with(req, Err(CallError::new(err.code(), err.to_string())));
    }

    /// Answer a request with either a result or an error. Notifications
    /// are marked answered without writing anything.
    pub fn respond_with(&mut self, mut req: RequestContext, outcome: Result<Value, CallError>) {
        req.answered = true;
        let Some(id) = req.id else {
            return;
        };

        let frame = match outcome {
            Ok(result) => Frame::response(id, &self.config.local_id, &req.src, result),
            Err(e) => Frame::error(id, &self.config.local_id, &req.src, e.code, &e.message),
        };
        self.write_frame(req.channel, &frame);
    }

    // ── Outbound calls ────────────────────────────────────────

    /// Call `method` on `dst` (or the default peer). `callback` runs
    /// exactly once: with the peer's reply, or with `NoPeerConfigured`,
    /// `Abandoned` or `TimedOut`.
    ///
    /// With no resolvable destination the callback runs before this
    /// returns, no channel is created, and the error is also returned.
    pub fn call<F>(
        &mut self,
        method: &str,
        args: Value,
        dst: Option<&str>,
        callback: F,
    ) -> Result<u64, RpcError>
    where
        F: FnOnce(&mut Dispatcher, CallResult) + 'static,
    {
        let dst = dst
            .filter(|d| !d.is_empty())
            .map(str::to_owned)
            .or_else(|| self.config.default_peer.clone().filter(|d| !d.is_empty()));
        let Some(dst) = dst else {
            warn!("RPC: {} not sent, peer address not configured", method);
            callback(self, Err(RpcError::NoPeerConfigured.into()));
            return Err(RpcError::NoPeerConfigured);
        };

        let id = self.pending.alloc_id();
        let bytes = match Frame::request(Some(id), &self.config.local_id, &dst, method, args).to_bytes() {
            Ok(b) => b,
            Err(e) => {
                callback(self, Err(e.clone().into()));
                return Err(e);
            }
        };

        let route = self.channels.get_or_create(&dst);
        if route.needs_connect {
            self.outbound.push_back(Outbound::Connect {
                channel: route.channel,
                dst: dst.clone(),
            });
        }

        let state = if self.channels.is_open(route.channel) {
            self.outbound.push_back(Outbound::Send {
                channel: route.channel,
                frame: bytes,
            });
            CallState::AwaitingResponse
        } else {
            self.channels.enqueue(route.channel, bytes);
            CallState::Sent
        };

        info!("RPC: calling {} on {} (id {})", method, dst, id);
        self.pending.insert(PendingCall {
            id,
            method: method.to_owned(),
            dst,
            channel: route.channel,
            created_at: Instant::now(),
            state,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Send an id-less request to every open broadcast-enabled channel.
    /// Returns the number of channels it was written to.
    pub fn broadcast(&mut self, method: &str, args: Value) -> usize {
        let bytes = match Frame::request(None, &self.config.local_id, "", method, args).to_bytes() {
            Ok(b) => b,
            Err(e) => {
                warn!("RPC: broadcast {} not encoded: {}", method, e);
                return 0;
            }
        };
        let targets = self.channels.broadcast_targets();
        for &channel in &targets {
            self.outbound.push_back(Outbound::Send {
                channel,
                frame: bytes.clone(),
            });
        }
        debug!("RPC: broadcast {} to {} channel(s)", method, targets.len());
        targets.len()
    }

    // ── Timeouts ──────────────────────────────────────────────

    /// Fail every call older than the configured timeout with `TimedOut`.
    /// Returns the number of calls reclaimed.
    pub fn sweep_timeouts(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.config.call_timeout else {
            return 0;
        };
        let expired = self.pending.take_expired(now, timeout);
        let reclaimed = expired.len();
        for call in expired {
            warn!("RPC: {} (id {}) to {} timed out", call.method, call.id, call.dst);
            (call.callback)(self, Err(RpcError::TimedOut.into()));
        }
        reclaimed
    }

    // ── Channel lifecycle ─────────────────────────────────────

    /// Register a channel the transport accepted; it starts open.
    pub fn channel_connected(
        &mut self,
        kind: &str,
        info: &str,
        dst: &str,
        persistent: bool,
        broadcast: bool,
    ) -> ChannelId {
        self.channels.add(kind, info, dst, persistent, broadcast)
    }

    /// The transport finished connecting `channel`: flush its queue.
    pub fn channel_opened(&mut self, channel: ChannelId) {
        let Some(queued) = self.channels.mark_open(channel) else {
            debug!("RPC[{}]: open for unknown channel", channel);
            return;
        };
        for frame in queued {
            self.outbound.push_back(Outbound::Send { channel, frame });
        }
        self.pending.mark_written(channel);
    }

    /// The transport lost `channel` (or never connected it). Every call
    /// still waiting on it is abandoned.
    pub fn channel_closed(&mut self, channel: ChannelId) {
        if self.channels.mark_closed(channel) == Closed::Unknown {
            debug!("RPC[{}]: close for unknown channel", channel);
        }
        self.outbound.retain(|o| {
            !matches!(
                o,
                Outbound::Send { channel: c, .. } | Outbound::Connect { channel: c, .. } if *c == channel
            )
        });

        for call in self.pending.take_for_channel(channel) {
            info!(
                "RPC: {} (id {}) abandoned, channel {} closed",
                call.method, call.id, channel
            );
            (call.callback)(self, Err(RpcError::Abandoned.into()));
        }
    }

    pub fn set_channel_persistent(&mut self, channel: ChannelId, persistent: bool) {
        self.channels.set_persistent(channel, persistent);
    }

    pub fn set_channel_broadcast(&mut self, channel: ChannelId, broadcast: bool) {
        self.channels.set_broadcast(channel, broadcast);
    }

    /// Snapshot of every channel, in insertion order. Read-only.
    pub fn describe_channels(&self) -> Vec<ChannelInfo> {
        self.channels.enumerate()
    }

    // ── Output ────────────────────────────────────────────────

    pub fn poll_outbound(&mut self) -> Option<Outbound> {
        self.outbound.pop_front()
    }

    /// Hand every queued action to `transport`. A failed connect or
    /// write closes the channel, which abandons its calls.
    pub fn flush_to<T: Transport>(&mut self, transport: &mut T) {
        while let Some(out) = self.outbound.pop_front() {
            match out {
                Outbound::Connect { channel, dst } => {
                    if let Err(e) = transport.connect(channel, &dst) {
                        warn!("RPC[{}]: connect to {} failed: {:?}", channel, dst, e);
                        self.channel_closed(channel);
                    }
                }
                Outbound::Send { channel, frame } => {
                    if let Err(e) = transport.send(channel, &frame) {
                        warn!("RPC[{}]: write failed: {:?}", channel, e);
                        transport.close(channel);
                        self.channel_closed(channel);
                    }
                }
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn write_frame(&mut self, channel: ChannelId, frame: &Frame) {
        let bytes = match frame.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                warn!("RPC[{}]: frame not encoded: {}", channel, e);
                return;
            }
        };
        if self.channels.is_open(channel) {
            self.outbound.push_back(Outbound::Send {
                channel,
                frame: bytes,
            });
        } else if !self.channels.enqueue(channel, bytes) {
            warn!("RPC[{}]: channel gone, response dropped", channel);
        }
    }

    fn register_builtins(&mut self) {
        let list = typed(|rpc: &mut Dispatcher, req: RequestContext, _: Value| {
            let names: Vec<Value> = rpc.methods.names().map(Value::from).collect();
            rpc.respond(req, Value::Array(names));
        });
        let describe = typed(|rpc: &mut Dispatcher, req: RequestContext, args: DescribeArgs| {
            match rpc.methods.describe(&args.name) {
                Ok(v) => rpc.respond(req, v),
                Err(e) => rpc.respond_error(req, &e),
            }
        });
        let ping = typed(|rpc: &mut Dispatcher, req: RequestContext, _: Value| {
            rpc.respond(req, json!("pong"));
        });

        for (name, shape, handler) in [
            ("RPC.List", "", list),
            ("RPC.Describe", "{name: %Q}", describe),
            ("RPC.Ping", "", ping),
        ] {
            if let Err(e) = self.methods.register(name, shape, handler) {
                warn!("RPC: built-in {} not registered: {}", name, e);
            }
        }
    }
}
