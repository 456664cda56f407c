//! Outstanding outbound calls, keyed by correlation id.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::channels::ChannelId;
use super::engine::Dispatcher;
use crate::error::CallError;

/// What a call's callback receives.
pub type CallResult = Result<Value, CallError>;

/// Response callback. Boxed `FnOnce`: delivery consumes it.
pub type Callback = Box<dyn FnOnce(&mut Dispatcher, CallResult)>;

/// Non-terminal states of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Encoded and queued on a channel that is still connecting.
    Sent,
    /// Written to an open channel.
    AwaitingResponse,
}

pub struct PendingCall {
    pub id: u64,
    pub method: String,
    pub dst: String,
    pub channel: ChannelId,
    pub created_at: Instant,
    pub state: CallState,
    pub callback: Callback,
}

/// Correlation table. At most one record per id.
pub struct PendingCalls {
    calls: BTreeMap<u64, PendingCall>,
    next_id: u64,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            calls: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Next correlation id not held by any outstanding call. Never 0.
    pub fn alloc_id(&mut self) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.calls.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, call: PendingCall) {
        debug_assert!(!self.calls.contains_key(&call.id));
        self.calls.insert(call.id, call);
    }

    pub fn take(&mut self, id: u64) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&PendingCall> {
        self.calls.get(&id)
    }

    /// Promote every queued call on `channel` once its frames are written.
    pub fn mark_written(&mut self, channel: ChannelId) {
        for call in self.calls.values_mut().filter(|c| c.channel == channel) {
            call.state = CallState::AwaitingResponse;
        }
    }

    /// Remove and return every call riding on `channel`, oldest id first.
    pub fn take_for_channel(&mut self, channel: ChannelId) -> Vec<PendingCall> {
        let ids: Vec<u64> = self
            .calls
            .values()
            .filter(|c| c.channel == channel)
            .map(|c| c.id)
            .collect();
        ids.into_iter().filter_map(|id| self.calls.remove(&id)).collect()
    }

    /// Remove and return every call older than `timeout` at `now`.
    pub fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<PendingCall> {
        let ids: Vec<u64> = self
            .calls
            .values()
            .filter(|c| now.saturating_duration_since(c.created_at) >= timeout)
            .map(|c| c.id)
            .collect();
        ids.into_iter().filter_map(|id| self.calls.remove(&id)).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
