//! Error types for fsmwire.

use thiserror::Error;

/// Main error type for all fsmwire operations.
#[derive(Debug, Error)]
pub enum FsmWireError {
    /// I/O error during link operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port configuration or open error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// A frame violated the wire format: declared length inconsistent
    /// with the data, or outside the legal bounds.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// An outbound payload would not fit in a frame.
    #[error("invalid payload: {0} bytes exceeds maximum of {1}")]
    InvalidPayload(usize, usize),

    /// FSM construction was refused: registry at capacity or parameter
    /// validation failed.
    #[error("FSM creation rejected: {0}")]
    Rejected(&'static str),

    /// No matching reply arrived within the caller's deadline.
    #[error("timed out waiting for reply from peer {0}")]
    Timeout(u8),

    /// The engine is closed, or was never opened.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using FsmWireError.
pub type Result<T> = std::result::Result<T, FsmWireError>;
