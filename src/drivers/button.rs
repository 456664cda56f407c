//! Debounced push button.
//!
//! The input side only reports raw press edges with a monotonic
//! timestamp (stdin lines on the host). Contact bounce produces bursts of
//! edges; [`ButtonDebouncer::on_edge`] turns each burst into one press.
//!
//! | Edge                                       | Result  |
//! |--------------------------------------------|---------|
//! | first edge                                 | press   |
//! | within `debounce_ms` of the last press     | ignored |
//! | `debounce_ms` or more after the last press | press   |

use log::debug;

pub const DEFAULT_DEBOUNCE_MS: u64 = 20;

#[derive(Debug, Clone)]
pub struct ButtonDebouncer {
    debounce_ms: u64,
    last_press_ms: Option<u64>,
    presses: u64,
}

impl Default for ButtonDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS)
    }
}

impl ButtonDebouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            last_press_ms: None,
            presses: 0,
        }
    }

    /// Feed one raw edge. Returns `true` if it counts as a new press.
    pub fn on_edge(&mut self, at_ms: u64) -> bool {
        if let Some(last) = self.last_press_ms {
            if at_ms.saturating_sub(last) < self.debounce_ms {
                debug!("Button: bounce at {} ms ignored", at_ms);
                return false;
            }
        }
        self.last_press_ms = Some(at_ms);
        self.presses += 1;
        true
    }

    /// Accepted presses since startup.
    pub fn presses(&self) -> u64 {
        self.presses
    }
}
