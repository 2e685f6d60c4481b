//! Frame buffer for accumulating partial reads.
//!
//! The transport may deliver as little as one byte per completion, so the
//! assembler is a restartable state machine:
//! - `AwaitingLength1`: need the first length byte
//! - `AwaitingLength2`: first length byte stashed, need its friend
//! - `AwaitingBody`: length parsed, need `length - 2` more bytes
//!
//! A declared length outside the legal bounds discards the stashed bytes
//! and restarts at `AwaitingLength1`. That resync point is the stream's
//! only recovery mechanism; there is no checksum.
//!
//! All data lives in a single reused `BytesMut`, replacing the
//! allocate-per-state-transition buffers of naive implementations.
//!
//! # Example
//!
//! ```
//! use fsmwire::protocol::{Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let wire = Frame::from_parts(2, b"on").encode().unwrap();
//!
//! // Bytes arrive in arbitrary chunks from the port
//! assert!(buffer.push(&wire[..1]).is_empty());
//! let frames = buffer.push(&wire[1..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].peer_id, 2);
//! ```

use bytes::{Bytes, BytesMut};
use tracing::trace;

use super::wire_format::length_in_bounds;
use super::Frame;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the first byte of the length field.
    AwaitingLength1,
    /// Holding the low length byte, waiting for the high one.
    AwaitingLength2 { low: u8 },
    /// Length parsed, accumulating the rest of the frame.
    AwaitingBody { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// No thread-safety of its own: it is driven exclusively by the single
/// reader control flow.
pub struct FrameBuffer {
    /// Accumulated bytes not yet consumed by the state machine.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            state: State::AwaitingLength1,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing bytes off the link. Partial
    /// data is buffered internally for the next push. Corrupt length
    /// prefixes are skipped (self-healing), so this never fails.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Try to advance the state machine by one transition chain,
    /// returning a frame if one completed.
    fn try_extract_one(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::AwaitingLength1 => {
                    if self.buffer.len() >= 2 {
                        let low = self.buffer[0];
                        let high = self.buffer[1];
                        let _ = self.buffer.split_to(2);
                        self.accept_length(u16::from_le_bytes([low, high]));
                    } else if self.buffer.len() == 1 {
                        // Transport delivered the length bytes separately.
                        let low = self.buffer[0];
                        let _ = self.buffer.split_to(1);
                        self.state = State::AwaitingLength2 { low };
                        return None;
                    } else {
                        return None;
                    }
                }

                State::AwaitingLength2 { low } => {
                    if self.buffer.is_empty() {
                        return None;
                    }
                    let high = self.buffer[0];
                    let _ = self.buffer.split_to(1);
                    self.accept_length(u16::from_le_bytes([low, high]));
                }

                State::AwaitingBody { remaining } => {
                    if self.buffer.len() < remaining {
                        return None;
                    }
                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::AwaitingLength1;
                    return Some(Frame {
                        peer_id: body[0],
                        payload: body_payload(&body),
                    });
                }
            }
        }
    }

    /// Validate a parsed length field and transition accordingly.
    ///
    /// A bad length drops the two length bytes already consumed and
    /// restarts the scan at the next byte.
    fn accept_length(&mut self, length: u16) {
        if length_in_bounds(length) {
            // Two length bytes are already consumed; the body is the rest.
            self.state = State::AwaitingBody {
                remaining: length as usize - 2,
            };
        } else {
            trace!(length, "discarding out-of-bounds frame length, resyncing");
            self.state = State::AwaitingLength1;
        }
    }

    /// Get the number of buffered, unparsed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer holds no unparsed bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes and restart at `AwaitingLength1`.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::AwaitingLength1;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::AwaitingLength1 => "AwaitingLength1",
            State::AwaitingLength2 { .. } => "AwaitingLength2",
            State::AwaitingBody { .. } => "AwaitingBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Slice the payload out of a frozen body (`peer_id ‖ payload`), zero-copy.
fn body_payload(body: &Bytes) -> Bytes {
    body.slice(1..)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::MAX_FRAME_LEN;

    fn wire(peer_id: u8, payload: &[u8]) -> Vec<u8> {
        Frame::from_parts(peer_id, payload)
            .encode()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&wire(5, b"hello"));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].peer_id, 5);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = wire(1, b"first");
        combined.extend(wire(2, b"second"));
        combined.extend(wire(3, b""));

        let frames = buffer.push(&combined);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].peer_id, 1);
        assert_eq!(frames[1].peer_id, 2);
        assert_eq!(frames[2].peer_id, 3);
        assert!(frames[2].payload.is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_split_length_field() {
        let mut buffer = FrameBuffer::new();
        let bytes = wire(4, b"data");

        // One length byte only: stashed in AwaitingLength2.
        assert!(buffer.push(&bytes[..1]).is_empty());
        assert_eq!(buffer.state_name(), "AwaitingLength2");

        // Second length byte arrives on its own.
        assert!(buffer.push(&bytes[1..2]).is_empty());
        assert_eq!(buffer.state_name(), "AwaitingBody");

        let frames = buffer.push(&bytes[2..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"data");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = wire(7, b"one byte at a time");

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].peer_id, 7);
        assert_eq!(all_frames[0].payload(), b"one byte at a time");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_every_chunking_yields_one_frame() {
        let bytes = wire(9, b"chunky");

        for split in 1..bytes.len() {
            let mut buffer = FrameBuffer::new();
            let mut frames = buffer.push(&bytes[..split]);
            frames.extend(buffer.push(&bytes[split..]));

            assert_eq!(frames.len(), 1, "split at {}", split);
            assert_eq!(frames[0].payload(), b"chunky");
        }
    }

    #[test]
    fn test_resync_after_bad_length() {
        for bad in [0u16, 1, 2, MAX_FRAME_LEN as u16 + 1] {
            let mut buffer = FrameBuffer::new();

            let mut stream = bad.to_le_bytes().to_vec();
            stream.extend(wire(6, b"survivor"));

            let frames = buffer.push(&stream);
            assert_eq!(frames.len(), 1, "bad length {}", bad);
            assert_eq!(frames[0].peer_id, 6);
            assert_eq!(frames[0].payload(), b"survivor");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_resync_with_split_bad_length() {
        let mut buffer = FrameBuffer::new();

        // Bad length 0xFFFF delivered one byte at a time.
        assert!(buffer.push(&[0xFF]).is_empty());
        assert!(buffer.push(&[0xFF]).is_empty());
        assert_eq!(buffer.state_name(), "AwaitingLength1");

        let frames = buffer.push(&wire(2, b"ok"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"ok");
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame1 = wire(1, b"whole");
        let frame2 = wire(2, b"partial");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..4]);

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].peer_id, 1);

        let frames = buffer.push(&frame2[4..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].peer_id, 2);
        assert_eq!(frames[0].payload(), b"partial");
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let bytes = wire(3, b"interrupted");

        buffer.push(&bytes[..5]);
        assert_eq!(buffer.state_name(), "AwaitingBody");
        assert!(!buffer.is_empty());

        buffer.clear();
        assert_eq!(buffer.state_name(), "AwaitingLength1");
        assert!(buffer.is_empty());

        // Fresh frame parses cleanly after the clear.
        let frames = buffer.push(&wire(4, b"fresh"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"fresh");
    }

    #[test]
    fn test_max_size_frame() {
        let mut buffer = FrameBuffer::new();
        let payload = vec![0x5A; MAX_FRAME_LEN - 3];
        let frames = buffer.push(&wire(8, &payload));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload_len(), payload.len());
    }
}
