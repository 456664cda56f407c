//! Log-backed status LED.
//!
//! Implements [`LedPort`] on hosts without a GPIO: every change is
//! written to the log together with the pin level it would drive.

use log::info;

use crate::app::ports::LedPort;

pub struct LogLed {
    on: bool,
    active_high: bool,
}

impl LogLed {
    pub fn new(active_high: bool) -> Self {
        Self {
            on: false,
            active_high,
        }
    }

    /// Pin level for the current state, honouring polarity.
    pub fn level(&self) -> bool {
        self.on == self.active_high
    }
}

impl LedPort for LogLed {
    fn set(&mut self, on: bool) {
        self.on = on;
        info!("LED: {} (level {})", if on { "on" } else { "off" }, u8::from(self.level()));
    }

    fn is_on(&self) -> bool {
        self.on
    }
}
