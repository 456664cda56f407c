//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields an empty or oversized
//! payload, and behaves the same after a reset.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE};

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();

    let mut first = Vec::new();
    decoder.feed(data, |payload| {
        assert!(payload.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
        assert!(!payload.is_empty(), "decoder must not yield empty payload");
        first.push(payload.to_vec());
    });

    decoder.reset();
    let mut second = Vec::new();
    decoder.feed(data, |payload| second.push(payload.to_vec()));
    assert_eq!(first, second, "reset must restore a clean decoder");
});
