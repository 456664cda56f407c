//! Adapters: concrete implementations of the app's port traits.
//!
//! | Adapter | Implements            | Connects to                  |
//! |---------|-----------------------|------------------------------|
//! | `led`   | LedPort               | log output                   |
//! | `tcp`   | Transport, LinkPort   | `std::net` TCP, length-prefix|

pub mod led;
pub mod tcp;
