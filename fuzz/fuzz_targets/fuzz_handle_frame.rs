//! Fuzz target: `Dispatcher::handle_frame`
//!
//! Feeds arbitrary bytes to a dispatcher as if they arrived on an inbound
//! channel. Must never panic, and every frame written back must be valid
//! JSON carrying either a result or an error.
//!
//! cargo fuzz run fuzz_handle_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink::rpc::{Dispatcher, DispatcherConfig, Outbound};

fuzz_target!(|data: &[u8]| {
    let mut rpc = Dispatcher::new(DispatcherConfig {
        local_id: "fuzz".into(),
        default_peer: Some("tcp://peer:1".into()),
        call_timeout: None,
    });
    let ch = rpc.channel_connected("TCP_in", "fuzz", "", false, true);
    let _ = rpc.call("RPC.Ping", serde_json::Value::Null, None, |_, _| {});

    rpc.handle_frame(ch, data);

    while let Some(out) = rpc.poll_outbound() {
        if let Outbound::Send { channel, frame } = out {
            if channel == ch {
                let v: serde_json::Value = serde_json::from_slice(&frame).expect("valid JSON");
                assert!(v.get("result").is_some() || v.get("error").is_some() || v.get("id").is_some());
            }
        }
    }
});
