//! peerlink main entry point
//!
//! Single dispatch thread fed by an event queue.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  TcpLinks (accept / connect / reader threads)   LogLed         │
//! │  stdin reader (button edges)    ticker thread (Ticker)         │
//! │                                                                │
//! │  ──────────────── EventQueue (bounded) ──────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              App (dispatch thread)                     │    │
//! │  │  Dispatcher · MethodRegistry · ChannelRegistry         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `peerlink [config.json]`. Each line on stdin is one button edge.

use std::io::{self, BufRead};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info};
use tracing_subscriber::EnvFilter;

use peerlink::adapters::led::LogLed;
use peerlink::adapters::tcp::TcpLinks;
use peerlink::app::App;
use peerlink::config::Config;
use peerlink::diagnostics;
use peerlink::events::{Event, EventQueue, NetEvent};
use peerlink::scheduler::{Schedule, TickKind, Ticker};

static EVENTS: EventQueue = EventQueue::new();

fn millis_since(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// ── Ticker thread ─────────────────────────────────────────────

fn spawn_ticker(config: &Config, start: Instant) -> io::Result<()> {
    let mut ticker = Ticker::new();
    ticker.add(Schedule {
        label: "channel-info",
        kind: TickKind::ChannelInfo,
        interval_ms: config.rpc.channel_info_interval_ms,
        enabled: true,
    });
    if config.rpc.call_timeout_ms.is_some() {
        ticker.add(Schedule {
            label: "timeout-sweep",
            kind: TickKind::TimeoutSweep,
            interval_ms: config.rpc.sweep_interval_ms,
            enabled: true,
        });
    }

    thread::Builder::new().name("ticker".into()).spawn(move || {
        let mut sink = &EVENTS;
        loop {
            ticker.tick(millis_since(start), &mut sink);
            let wait = ticker.time_to_next(millis_since(start)).unwrap_or(1000);
            thread::sleep(Duration::from_millis(wait.max(1)));
        }
    })?;
    Ok(())
}

// ── Button reader ─────────────────────────────────────────────

fn spawn_button_reader(start: Instant) -> io::Result<()> {
    thread::Builder::new().name("button".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() {
                break;
            }
            EVENTS.push(Event::ButtonPressed {
                at_ms: millis_since(start),
            });
        }
        debug!("Button: stdin closed");
    })?;
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    diagnostics::install_panic_handler();
    info!("peerlink v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration ──────────────────────────────────────
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load(Path::new(&path))?,
        None => {
            info!("No config file given, using defaults");
            Config::default()
        }
    };

    // ── 3. Application + method registration ──────────────────
    let mut app = App::new(&config, LogLed::new(config.board.led_active_high))
        .context("registering RPC methods")?;

    // ── 4. Transport ──────────────────────────────────────────
    let mut links = TcpLinks::new(&EVENTS);
    let local = links
        .listen(&config.rpc.listen)
        .with_context(|| format!("binding {}", config.rpc.listen))?;

    // ── 5. Event sources ──────────────────────────────────────
    let start = Instant::now();
    spawn_ticker(&config, start).context("starting ticker thread")?;
    spawn_button_reader(start).context("starting button reader")?;
    EVENTS.push(Event::Net(NetEvent::IpAcquired(local.ip())));

    // ── 6. Dispatch loop ──────────────────────────────────────
    loop {
        let event = futures_lite::future::block_on(EVENTS.next());
        app.handle_event(event, &mut links);
    }
}
