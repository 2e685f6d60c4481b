//! Wire format constants and length-field helpers.
//!
//! Every message on the link is a length-prefixed frame:
//! ```text
//! ┌──────────┬─────────┬───────────────────┐
//! │ Length   │ Peer ID │ Payload           │
//! │ 2 bytes  │ 1 byte  │ length - 3 bytes  │
//! │ u16 LE   │ u8      │                   │
//! └──────────┴─────────┴───────────────────┘
//! ```
//!
//! `length` counts the whole frame, the length field included. Integers
//! are encoded little-endian explicitly, so the codec reads the same on
//! any host.

/// Frame overhead in bytes: the u16 length field plus the peer id.
pub const FRAME_OVERHEAD: usize = 3;

/// Smallest legal frame: header with an empty payload.
pub const MIN_FRAME_LEN: usize = FRAME_OVERHEAD;

/// Largest legal frame. Bounds assembler buffer allocation; a declared
/// length above this is treated as line noise and resynced past.
pub const MAX_FRAME_LEN: usize = 512;

/// Largest payload that fits in a single frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_OVERHEAD;

/// Reserved peer id for the control plane ("master"). All other peer ids
/// are FSM type codes owned by the application's catalog.
pub const PEER_MASTER: u8 = 0;

/// Control-plane opcodes (first payload byte of a `PEER_MASTER` frame).
pub mod opcodes {
    /// Create an FSM instance: payload = `[opcode, type_code, params...]`.
    pub const OP_CREATE: u8 = 0;
    /// Destroy an FSM instance: payload = `[opcode, fingerprint]`.
    pub const OP_DESTROY: u8 = 1;
    /// List live FSM instances: payload = `[opcode]`; the reply carries
    /// length-prefixed per-instance descriptor records.
    pub const OP_LIST: u8 = 2;
}

/// Read a frame's length field from the first two bytes.
///
/// Returns `None` if fewer than two bytes are supplied.
#[inline]
pub fn read_length(buf: &[u8]) -> Option<u16> {
    if buf.len() < 2 {
        return None;
    }
    Some(u16::from_le_bytes([buf[0], buf[1]]))
}

/// Check a declared frame length against the legal bounds.
#[inline]
pub fn length_in_bounds(length: u16) -> bool {
    (MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&(length as usize))
}

/// Append one length-prefixed sub-record (as used by LIST replies) to a
/// buffer. The u16 prefix counts itself plus the record body.
pub fn push_record(buf: &mut bytes::BytesMut, body: &[u8]) {
    use bytes::BufMut;
    buf.put_u16_le(body.len() as u16 + 2);
    buf.put_slice(body);
}

/// Split a run of length-prefixed sub-records into their bodies.
///
/// A record whose prefix overruns the remaining bytes is clamped to what
/// is left, matching the forgiving parse on the host side of the original
/// protocol. Trailing bytes too short to hold a prefix are ignored.
pub fn parse_records(mut buf: &[u8]) -> Vec<&[u8]> {
    let mut records = Vec::new();
    while buf.len() >= 2 {
        let declared = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let body_len = declared.saturating_sub(2).min(buf.len() - 2);
        records.push(&buf[2..2 + body_len]);
        buf = &buf[2 + body_len..];
    }
    records
}
