//! Port traits: the boundary between the app and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ App (domain)
//! ```
//!
//! Adapters (status LED, TCP links) implement these traits. The
//! [`App`](super::service::App) consumes them via generics, so the
//! domain core is testable with mocks.

use crate::events::TransportEvent;
use crate::rpc::{Dispatcher, Transport};

// ───────────────────────────────────────────────────────────────
// Status LED (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait LedPort {
    /// Set the logical state (`true` = lit), independent of polarity.
    fn set(&mut self, on: bool);

    fn is_on(&self) -> bool;

    fn toggle(&mut self) {
        let on = self.is_on();
        self.set(!on);
    }
}

// ───────────────────────────────────────────────────────────────
// Links (driving + driven adapter: peers ↔ dispatcher)
// ───────────────────────────────────────────────────────────────

/// A transport that also reports connection activity back into the
/// dispatcher. Both halves run on the dispatch thread.
pub trait LinkPort: Transport {
    fn on_transport_event(&mut self, event: TransportEvent, rpc: &mut Dispatcher);
}
