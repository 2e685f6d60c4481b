//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol shared by both ends of the
//! link:
//! - length-prefixed frame encoding/decoding
//! - frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    length_in_bounds, opcodes, parse_records, push_record, read_length, FRAME_OVERHEAD,
    MAX_FRAME_LEN, MAX_PAYLOAD_LEN, MIN_FRAME_LEN, PEER_MASTER,
};
