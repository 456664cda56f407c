//! Application service. Owns the dispatcher and maps events onto it.
//!
//! ```text
//!   Event ──▶ ┌────────────────────────────┐ ──▶ LinkPort (flush)
//!             │            App             │
//!   LedPort ◀─│  Dispatcher · AppState     │
//!             └────────────────────────────┘
//! ```
//!
//! Runs entirely on the dispatch thread. Handler closures share
//! [`AppState`] through `Rc<RefCell<_>>`; no borrow is held across a
//! dispatcher call.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info};

use super::handlers;
use super::ports::{LedPort, LinkPort};
use crate::config::Config;
use crate::diagnostics;
use crate::drivers::button::ButtonDebouncer;
use crate::error::RpcError;
use crate::events::{Event, NetEvent};
use crate::rpc::Dispatcher;

/// Number sent with the first outbound increment.
pub const INITIAL_PEER_NUM: i64 = 111;

/// State shared between the app and its handlers.
pub struct AppState<L> {
    /// Last number a peer returned from `Example.Increment`.
    pub peer_num: i64,
    /// Inbound increments answered.
    pub increments_served: u64,
    pub led: L,
}

impl<L: LedPort> AppState<L> {
    pub fn new(led: L) -> Self {
        Self {
            peer_num: INITIAL_PEER_NUM,
            increments_served: 0,
            led,
        }
    }
}

pub struct App<L: LedPort + 'static> {
    rpc: Dispatcher,
    state: Rc<RefCell<AppState<L>>>,
    button: ButtonDebouncer,
}

impl<L: LedPort + 'static> App<L> {
    /// Build the dispatcher and register the example methods.
    /// A registration conflict is fatal for the caller.
    pub fn new(config: &Config, led: L) -> Result<Self, RpcError> {
        let mut rpc = Dispatcher::new(config.dispatcher_config());
        let state = Rc::new(RefCell::new(AppState::new(led)));
        handlers::register(&mut rpc, &state)?;
        info!(
            "App: {} ready, default peer {}",
            config.device_id,
            config.peer().unwrap_or("<none>")
        );
        Ok(Self {
            rpc,
            state,
            button: ButtonDebouncer::new(config.board.btn_debounce_ms),
        })
    }

    pub fn rpc(&self) -> &Dispatcher {
        &self.rpc
    }

    pub fn rpc_mut(&mut self) -> &mut Dispatcher {
        &mut self.rpc
    }

    pub fn peer_num(&self) -> i64 {
        self.state.borrow().peer_num
    }

    pub fn increments_served(&self) -> u64 {
        self.state.borrow().increments_served
    }

    pub fn led_is_on(&self) -> bool {
        self.state.borrow().led.is_on()
    }

    /// Call the peer as a button press or network-up event would.
    pub fn call_peer(&mut self, peer: Option<&str>) -> Result<u64, RpcError> {
        handlers::call_peer(&mut self.rpc, &self.state, peer)
    }

    /// Process one event, then hand everything the dispatcher queued
    /// to `links`.
    pub fn handle_event(&mut self, event: Event, links: &mut impl LinkPort) {
        match event {
            Event::ButtonPressed { at_ms } => {
                if self.button.on_edge(at_ms) {
                    info!("App: button pressed, calling peer");
                    if let Err(e) = self.call_peer(None) {
                        debug!("App: button call not sent: {}", e);
                    }
                }
            }
            Event::Net(NetEvent::IpAcquired(ip)) => {
                info!("App: got IP {}, calling peer", ip);
                if let Err(e) = self.call_peer(None) {
                    debug!("App: net-up call not sent: {}", e);
                }
            }
            Event::ChannelInfoTick => {
                diagnostics::log_channels(&self.rpc.describe_channels());
            }
            Event::TimeoutSweep => {
                let expired = self.rpc.sweep_timeouts(Instant::now());
                if expired > 0 {
                    debug!("App: {} call(s) timed out", expired);
                }
            }
            Event::Transport(ev) => links.on_transport_event(ev, &mut self.rpc),
        }
        self.rpc.flush_to(links);
    }
}
