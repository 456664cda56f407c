//! Length-prefix frame codec for byte-stream transports.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ JSON frame (N B)         │
//! │ LE u32     │                          │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields every complete
//! frame. A single read may carry part of a header, part of a payload,
//! or several frames back to back.

/// Maximum frame payload size (protects against memory exhaustion).
pub const MAX_FRAME_SIZE: usize = 4096;

/// Frame header size (4-byte little-endian length).
const HEADER_SIZE: usize = 4;

enum DecoderState {
    ReadingHeader { collected: usize },
    ReadingPayload { expected: usize, collected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Box<[u8; MAX_FRAME_SIZE]>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Box::new([0; MAX_FRAME_SIZE]),
        }
    }

    /// Feed bytes into the decoder, calling `on_frame` once per complete
    /// payload in arrival order. Returns the number of frames yielded.
    ///
    /// A header announcing a zero-length or oversized payload is skipped
    /// and the decoder resynchronises on the following bytes.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(&[u8])) -> usize {
        let mut offset = 0;
        let mut frames = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - *collected).min(data.len() - offset);
                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;
                        self.state = if expected == 0 || expected > MAX_FRAME_SIZE {
                            DecoderState::ReadingHeader { collected: 0 }
                        } else {
                            DecoderState::ReadingPayload {
                                expected,
                                collected: 0,
                            }
                        };
                    }
                }

                DecoderState::ReadingPayload {
                    expected,
                    collected,
                } => {
                    let to_copy = (*expected - *collected).min(data.len() - offset);
                    self.payload_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == *expected {
                        let len = *expected;
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        on_frame(&self.payload_buf[..len]);
                        frames += 1;
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
    }
}

/// Encode a payload into a length-prefixed frame.
///
/// Returns `None` if the payload is empty or exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
        return None;
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Some(out)
}
