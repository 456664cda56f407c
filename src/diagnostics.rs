//! Runtime diagnostics.
//!
//! Periodic channel listing (a count header, then one log line per
//! registered channel) and a panic hook that routes the panic message
//! through the logger before the default hook runs.

use std::fmt::Write as _;

use log::info;

use crate::rpc::ChannelInfo;

/// One channel as a single log line:
/// `#0 TCP_in 10.0.0.2:51122 dst= open=1 persistent=0 broadcast=1`
pub fn format_channel(index: usize, ch: &ChannelInfo) -> String {
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "#{} {} {} dst={} open={} persistent={} broadcast={}",
        index,
        ch.kind,
        ch.info,
        ch.dst,
        u8::from(ch.is_open),
        u8::from(ch.is_persistent),
        u8::from(ch.is_broadcast_enabled),
    );
    line
}

/// Header line preceding the per-channel lines.
pub fn channels_header(count: usize) -> String {
    format!("RPC channels ({count}):")
}

/// Log a header and every channel. Logs nothing when `channels` is empty.
/// Returns the number of channels listed.
pub fn log_channels(channels: &[ChannelInfo]) -> usize {
    if channels.is_empty() {
        return 0;
    }
    info!("{}", channels_header(channels.len()));
    for (i, ch) in channels.iter().enumerate() {
        info!("  {}", format_channel(i, ch));
    }
    channels.len()
}

/// Install a panic hook that logs the panic reason, then defers to the
/// previously installed hook.
pub fn install_panic_handler() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        match info.location() {
            Some(loc) => log::error!("PANIC: {} at {}:{}", reason, loc.file(), loc.line()),
            None => log::error!("PANIC: {}", reason),
        }
        previous(info);
    }));
}
