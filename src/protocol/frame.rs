//! Frame struct and the stateless codec.
//!
//! A [`Frame`] is the unit of exchange between the host and the device.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use fsmwire::protocol::{Frame, PEER_MASTER};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(PEER_MASTER, Bytes::from_static(b"\x02"));
//! let wire = frame.encode().unwrap();
//! assert_eq!(Frame::decode(&wire).unwrap(), frame);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    length_in_bounds, read_length, FRAME_OVERHEAD, MAX_PAYLOAD_LEN, PEER_MASTER,
};
use crate::error::{FsmWireError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Target or source peer: `PEER_MASTER` or an FSM type code.
    pub peer_id: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from a peer id and payload.
    pub fn new(peer_id: u8, payload: Bytes) -> Self {
        Self { peer_id, payload }
    }

    /// Create a frame from a peer id and raw bytes (copies data).
    pub fn from_parts(peer_id: u8, payload: &[u8]) -> Self {
        Self {
            peer_id,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Total encoded size of this frame.
    #[inline]
    pub fn wire_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Check if this frame is addressed to the control plane.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.peer_id == PEER_MASTER
    }

    /// Encode this frame to wire bytes: `length ‖ peer_id ‖ payload`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the payload would push the frame past
    /// the u16 length field or the frame size ceiling.
    pub fn encode(&self) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FsmWireError::InvalidPayload(
                self.payload.len(),
                MAX_PAYLOAD_LEN,
            ));
        }

        let length = self.wire_len() as u16;
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u16_le(length);
        buf.put_u8(self.peer_id);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode a frame from a complete wire buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFrame` when the declared length does not match the
    /// supplied slice, or when the length is outside `[3, MAX_FRAME_LEN]`.
    pub fn decode(buf: &[u8]) -> Result<Frame> {
        let length = read_length(buf)
            .ok_or_else(|| FsmWireError::InvalidFrame("buffer shorter than length field".into()))?;

        if !length_in_bounds(length) {
            return Err(FsmWireError::InvalidFrame(format!(
                "declared length {} out of bounds",
                length
            )));
        }

        if length as usize != buf.len() {
            return Err(FsmWireError::InvalidFrame(format!(
                "declared length {} but got {} bytes",
                length,
                buf.len()
            )));
        }

        Ok(Frame {
            peer_id: buf[2],
            payload: Bytes::copy_from_slice(&buf[FRAME_OVERHEAD..]),
        })
    }
}
